//! Static schema bootstrap
//!
//! Creates every table and index with `IF NOT EXISTS` so start-up is
//! idempotent. There is no migration history: columns are only ever added
//! here, never renamed.

use sqlx::SqlitePool;
use tracing::{debug, info, warn};

/// Result of a schema bootstrap run
#[derive(Debug, Default)]
pub struct SchemaSyncResult {
    pub tables_created: Vec<String>,
    pub errors: Vec<String>,
}

/// Table definitions, in dependency order
const TABLES: &[(&str, &str)] = &[
    (
        "users",
        r#"CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE COLLATE NOCASE,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash TEXT NOT NULL,
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            membership_type TEXT NOT NULL DEFAULT 'public',
            department TEXT NOT NULL DEFAULT '',
            student_id TEXT UNIQUE,
            faculty_id TEXT UNIQUE,
            staff_id TEXT UNIQUE,
            phone TEXT NOT NULL DEFAULT '',
            emergency_contact TEXT NOT NULL DEFAULT '',
            role TEXT NOT NULL DEFAULT 'member',
            is_staff_approved INTEGER NOT NULL DEFAULT 0,
            email_verified INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            last_login_at TEXT,
            date_joined TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "user_groups",
        r#"CREATE TABLE IF NOT EXISTS user_groups (
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            group_name TEXT NOT NULL,
            PRIMARY KEY (user_id, group_name)
        )"#,
    ),
    (
        "revoked_tokens",
        r#"CREATE TABLE IF NOT EXISTS revoked_tokens (
            jti_hash TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            revoked_at TEXT NOT NULL
        )"#,
    ),
    (
        "notifications",
        r#"CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            category TEXT NOT NULL,
            read_at TEXT,
            created_at TEXT NOT NULL
        )"#,
    ),
    (
        "study_rooms",
        r#"CREATE TABLE IF NOT EXISTS study_rooms (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            room_type TEXT NOT NULL,
            capacity INTEGER NOT NULL,
            features TEXT NOT NULL DEFAULT '',
            location TEXT NOT NULL DEFAULT '',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "study_room_bookings",
        r#"CREATE TABLE IF NOT EXISTS study_room_bookings (
            id TEXT PRIMARY KEY,
            room_id TEXT NOT NULL REFERENCES study_rooms(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            date TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            number_of_people INTEGER NOT NULL,
            purpose TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'pending',
            notes TEXT NOT NULL DEFAULT '',
            decided_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "authors",
        r#"CREATE TABLE IF NOT EXISTS authors (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            bio TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "publishers",
        r#"CREATE TABLE IF NOT EXISTS publishers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            address TEXT NOT NULL DEFAULT '',
            website TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "faculties",
        r#"CREATE TABLE IF NOT EXISTS faculties (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            code TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "departments",
        r#"CREATE TABLE IF NOT EXISTS departments (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            faculty_id TEXT NOT NULL REFERENCES faculties(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (name, faculty_id)
        )"#,
    ),
    (
        "topics",
        r#"CREATE TABLE IF NOT EXISTS topics (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            department_id TEXT NOT NULL REFERENCES departments(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (name, department_id)
        )"#,
    ),
    (
        "genres",
        r#"CREATE TABLE IF NOT EXISTS genres (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "books",
        r#"CREATE TABLE IF NOT EXISTS books (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            isbn TEXT NOT NULL UNIQUE,
            publisher_id TEXT NOT NULL REFERENCES publishers(id) ON DELETE CASCADE,
            faculty_id TEXT REFERENCES faculties(id) ON DELETE SET NULL,
            department_id TEXT REFERENCES departments(id) ON DELETE SET NULL,
            topic_id TEXT REFERENCES topics(id) ON DELETE SET NULL,
            genre_id TEXT REFERENCES genres(id) ON DELETE SET NULL,
            description TEXT NOT NULL DEFAULT '',
            publication_date TEXT NOT NULL,
            edition TEXT NOT NULL DEFAULT '',
            pages INTEGER NOT NULL,
            language TEXT NOT NULL DEFAULT 'English',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "book_authors",
        r#"CREATE TABLE IF NOT EXISTS book_authors (
            book_id TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            author_id TEXT NOT NULL REFERENCES authors(id) ON DELETE CASCADE,
            PRIMARY KEY (book_id, author_id)
        )"#,
    ),
    (
        "book_copies",
        r#"CREATE TABLE IF NOT EXISTS book_copies (
            id TEXT PRIMARY KEY,
            book_id TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            barcode TEXT NOT NULL UNIQUE,
            condition TEXT NOT NULL DEFAULT 'good',
            status TEXT NOT NULL DEFAULT 'available',
            acquisition_date TEXT NOT NULL,
            location TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "loans",
        r#"CREATE TABLE IF NOT EXISTS loans (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            book_copy_id TEXT NOT NULL REFERENCES book_copies(id) ON DELETE CASCADE,
            loan_date TEXT NOT NULL,
            due_date TEXT NOT NULL,
            return_date TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            renewal_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "fines",
        r#"CREATE TABLE IF NOT EXISTS fines (
            id TEXT PRIMARY KEY,
            loan_id TEXT NOT NULL REFERENCES loans(id) ON DELETE CASCADE,
            amount TEXT NOT NULL,
            reason TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'unpaid',
            paid_date TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "reservations",
        r#"CREATE TABLE IF NOT EXISTS reservations (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            book_id TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            reservation_date TEXT NOT NULL,
            expiry_date TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "loan_requests",
        r#"CREATE TABLE IF NOT EXISTS loan_requests (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            book_copy_id TEXT NOT NULL REFERENCES book_copies(id) ON DELETE CASCADE,
            request_date TEXT NOT NULL,
            expiry_date TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            approval_date TEXT,
            rejection_date TEXT,
            processed_by TEXT,
            notes TEXT NOT NULL DEFAULT '',
            loan_id TEXT REFERENCES loans(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "attendance",
        r#"CREATE TABLE IF NOT EXISTS attendance (
            id TEXT PRIMARY KEY,
            user_id TEXT REFERENCES users(id) ON DELETE SET NULL,
            registration_number TEXT NOT NULL DEFAULT '',
            full_name TEXT NOT NULL,
            department TEXT NOT NULL DEFAULT '',
            faculty TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT '',
            purpose TEXT NOT NULL DEFAULT '',
            check_in TEXT NOT NULL,
            check_out TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "collections",
        r#"CREATE TABLE IF NOT EXISTS collections (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            curator_id TEXT REFERENCES users(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "ebooks",
        r#"CREATE TABLE IF NOT EXISTS ebooks (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            authors TEXT NOT NULL,
            abstract_text TEXT NOT NULL DEFAULT '',
            file_path TEXT NOT NULL,
            access_level TEXT NOT NULL DEFAULT 'open',
            doi TEXT UNIQUE,
            collection_id TEXT REFERENCES collections(id) ON DELETE SET NULL,
            uploaded_by TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            upload_date TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "ebook_permissions",
        r#"CREATE TABLE IF NOT EXISTS ebook_permissions (
            id TEXT PRIMARY KEY,
            ebook_id TEXT NOT NULL REFERENCES ebooks(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            granted INTEGER NOT NULL DEFAULT 0,
            granted_by TEXT,
            granted_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (ebook_id, user_id)
        )"#,
    ),
    (
        "ebook_permission_requests",
        r#"CREATE TABLE IF NOT EXISTS ebook_permission_requests (
            id TEXT PRIMARY KEY,
            ebook_id TEXT NOT NULL REFERENCES ebooks(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            reason TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'pending',
            reviewed_by TEXT,
            reviewed_at TEXT,
            review_notes TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "analytics_events",
        r#"CREATE TABLE IF NOT EXISTS analytics_events (
            id TEXT PRIMARY KEY,
            event_type TEXT NOT NULL,
            user_id TEXT REFERENCES users(id) ON DELETE SET NULL,
            session_id TEXT NOT NULL DEFAULT '',
            ip_address TEXT,
            user_agent TEXT NOT NULL DEFAULT '',
            page_url TEXT NOT NULL DEFAULT '',
            search_query TEXT NOT NULL DEFAULT '',
            book_id TEXT REFERENCES books(id) ON DELETE SET NULL,
            document_id TEXT REFERENCES ebooks(id) ON DELETE SET NULL,
            referrer TEXT NOT NULL DEFAULT '',
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        )"#,
    ),
    (
        "popular_items",
        r#"CREATE TABLE IF NOT EXISTS popular_items (
            id TEXT PRIMARY KEY,
            item_type TEXT NOT NULL,
            item_id TEXT NOT NULL,
            view_count INTEGER NOT NULL DEFAULT 0,
            checkout_count INTEGER NOT NULL DEFAULT 0,
            search_count INTEGER NOT NULL DEFAULT 0,
            total_score INTEGER NOT NULL DEFAULT 0,
            last_updated TEXT NOT NULL,
            UNIQUE (item_type, item_id)
        )"#,
    ),
    (
        "daily_stats",
        r#"CREATE TABLE IF NOT EXISTS daily_stats (
            date TEXT PRIMARY KEY,
            total_users INTEGER NOT NULL DEFAULT 0,
            active_users INTEGER NOT NULL DEFAULT 0,
            new_users INTEGER NOT NULL DEFAULT 0,
            total_books INTEGER NOT NULL DEFAULT 0,
            available_books INTEGER NOT NULL DEFAULT 0,
            checked_out_books INTEGER NOT NULL DEFAULT 0,
            total_loans INTEGER NOT NULL DEFAULT 0,
            active_loans INTEGER NOT NULL DEFAULT 0,
            overdue_loans INTEGER NOT NULL DEFAULT 0,
            returned_today INTEGER NOT NULL DEFAULT 0,
            total_documents INTEGER NOT NULL DEFAULT 0,
            document_downloads INTEGER NOT NULL DEFAULT 0,
            page_views INTEGER NOT NULL DEFAULT 0,
            searches INTEGER NOT NULL DEFAULT 0,
            logins INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "system_health",
        r#"CREATE TABLE IF NOT EXISTS system_health (
            id TEXT PRIMARY KEY,
            response_time REAL NOT NULL,
            cpu_usage REAL,
            memory_usage REAL,
            disk_usage REAL,
            error_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT NOT NULL DEFAULT '',
            db_connections INTEGER NOT NULL DEFAULT 0,
            db_query_count INTEGER NOT NULL DEFAULT 0,
            checked_at TEXT NOT NULL
        )"#,
    ),
    (
        "blog_posts",
        r#"CREATE TABLE IF NOT EXISTS blog_posts (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            author_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            status TEXT NOT NULL DEFAULT 'draft',
            published_date TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "events",
        r#"CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            date TEXT NOT NULL,
            time TEXT NOT NULL,
            location TEXT NOT NULL,
            organizer_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            max_attendees INTEGER,
            registration_deadline TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )"#,
    ),
    (
        "event_registrations",
        r#"CREATE TABLE IF NOT EXISTS event_registrations (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            UNIQUE (event_id, user_id)
        )"#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_bookings_room_date ON study_room_bookings(room_id, date, status)",
    "CREATE INDEX IF NOT EXISTS idx_copies_book_status ON book_copies(book_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_loans_user_status ON loans(user_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_loans_status_due ON loans(status, due_date)",
    "CREATE INDEX IF NOT EXISTS idx_fines_loan ON fines(loan_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_reservations_book ON reservations(book_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_loan_requests_status ON loan_requests(status, expiry_date)",
    "CREATE INDEX IF NOT EXISTS idx_events_type_created ON analytics_events(event_type, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_events_user_created ON analytics_events(user_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_events_created ON analytics_events(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_popular_score ON popular_items(item_type, total_score)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, read_at)",
];

/// Check if a table exists in the database
async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool, sqlx::Error> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table_name)
            .fetch_optional(pool)
            .await?;

    Ok(result.is_some())
}

/// Create all missing tables and indexes
pub async fn ensure_schema(pool: &SqlitePool) -> Result<SchemaSyncResult, sqlx::Error> {
    let mut result = SchemaSyncResult::default();

    for (table_name, ddl) in TABLES {
        if table_exists(pool, table_name).await? {
            continue;
        }
        debug!("Creating table {}", table_name);
        match sqlx::query(ddl).execute(pool).await {
            Ok(_) => {
                info!("Created table: {}", table_name);
                result.tables_created.push(table_name.to_string());
            }
            Err(e) => {
                let msg = format!("Failed to create table {}: {}", table_name, e);
                warn!("{}", msg);
                result.errors.push(msg);
            }
        }
    }

    for ddl in INDEXES {
        if let Err(e) = sqlx::query(ddl).execute(pool).await {
            let msg = format!("Failed to create index: {}", e);
            warn!("{}", msg);
            result.errors.push(msg);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        let first = ensure_schema(&pool).await.unwrap();
        assert!(first.errors.is_empty(), "{:?}", first.errors);
        assert_eq!(first.tables_created.len(), TABLES.len());

        let second = ensure_schema(&pool).await.unwrap();
        assert!(second.tables_created.is_empty());
        assert!(second.errors.is_empty());
    }
}
