//! Catalog repository: taxonomy, books and physical copies

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::sqlite_helpers::{like_pattern, new_id, now_utc};

// ============================================================================
// Enums
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, async_graphql::Enum,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum CopyCondition {
    Excellent,
    Good,
    Fair,
    Poor,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, async_graphql::Enum,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum CopyStatus {
    Available,
    CheckedOut,
    Lost,
    Damaged,
}

// ============================================================================
// Taxonomy Records
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuthorRecord {
    pub id: String,
    pub name: String,
    pub bio: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PublisherRecord {
    pub id: String,
    pub name: String,
    pub address: String,
    pub website: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FacultyRecord {
    pub id: String,
    pub name: String,
    pub code: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DepartmentRecord {
    pub id: String,
    pub name: String,
    pub code: String,
    pub description: String,
    pub faculty_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TopicRecord {
    pub id: String,
    pub name: String,
    pub code: String,
    pub description: String,
    pub department_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GenreRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Book Records
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BookRecord {
    pub id: String,
    pub title: String,
    pub isbn: String,
    pub publisher_id: String,
    pub faculty_id: Option<String>,
    pub department_id: Option<String>,
    pub topic_id: Option<String>,
    pub genre_id: Option<String>,
    pub description: String,
    pub publication_date: NaiveDate,
    pub edition: String,
    pub pages: i64,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateBook {
    pub title: String,
    pub isbn: String,
    pub author_ids: Vec<String>,
    pub publisher_id: String,
    pub faculty_id: Option<String>,
    pub department_id: Option<String>,
    pub topic_id: Option<String>,
    pub genre_id: Option<String>,
    pub description: String,
    pub publication_date: NaiveDate,
    pub edition: String,
    pub pages: i64,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BookCopyRecord {
    pub id: String,
    pub book_id: String,
    pub barcode: String,
    pub condition: CopyCondition,
    pub status: CopyStatus,
    pub acquisition_date: NaiveDate,
    pub location: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateBookCopy {
    pub book_id: String,
    pub barcode: String,
    pub condition: CopyCondition,
    pub acquisition_date: NaiveDate,
    pub location: String,
}

/// Search and filter options for books
#[derive(Debug, Clone, Default)]
pub struct BookFilter {
    pub query: Option<String>,
    pub faculty_id: Option<String>,
    pub department_id: Option<String>,
    pub topic_id: Option<String>,
    pub genre_id: Option<String>,
    pub author_id: Option<String>,
    pub available_only: bool,
}

impl BookFilter {
    /// WHERE clause (after `WHERE 1 = 1`) plus its ordered bind values
    fn to_sql(&self) -> (String, Vec<String>) {
        let mut clause = String::new();
        let mut params = Vec::new();

        if let Some(q) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let pattern = like_pattern(q);
            clause.push_str(
                r#" AND (b.title LIKE ? ESCAPE '\'
                    OR b.description LIKE ? ESCAPE '\'
                    OR b.isbn LIKE ? ESCAPE '\'
                    OR p.name LIKE ? ESCAPE '\'
                    OR g.name LIKE ? ESCAPE '\'
                    OR EXISTS (
                        SELECT 1 FROM book_authors ba JOIN authors a ON a.id = ba.author_id
                        WHERE ba.book_id = b.id AND a.name LIKE ? ESCAPE '\'
                    ))"#,
            );
            params.extend(std::iter::repeat_n(pattern, 6));
        }
        if let Some(ref id) = self.faculty_id {
            clause.push_str(" AND b.faculty_id = ?");
            params.push(id.clone());
        }
        if let Some(ref id) = self.department_id {
            clause.push_str(" AND b.department_id = ?");
            params.push(id.clone());
        }
        if let Some(ref id) = self.topic_id {
            clause.push_str(" AND b.topic_id = ?");
            params.push(id.clone());
        }
        if let Some(ref id) = self.genre_id {
            clause.push_str(" AND b.genre_id = ?");
            params.push(id.clone());
        }
        if let Some(ref id) = self.author_id {
            clause.push_str(
                " AND EXISTS (SELECT 1 FROM book_authors ba2 WHERE ba2.book_id = b.id AND ba2.author_id = ?)",
            );
            params.push(id.clone());
        }
        if self.available_only {
            clause.push_str(
                " AND EXISTS (SELECT 1 FROM book_copies c WHERE c.book_id = b.id AND c.status = 'available')",
            );
        }

        (clause, params)
    }
}

// ============================================================================
// Repository
// ============================================================================

pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Taxonomy
    // ========================================================================

    pub async fn create_author(&self, name: &str, bio: &str) -> Result<AuthorRecord> {
        let id = new_id();
        let now = now_utc();
        sqlx::query("INSERT INTO authors (id, name, bio, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
            .bind(&id)
            .bind(name)
            .bind(bio)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;
        self.get_author(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create author"))
    }

    pub async fn get_author(&self, id: &str) -> Result<Option<AuthorRecord>> {
        Ok(sqlx::query_as::<_, AuthorRecord>("SELECT * FROM authors WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_authors(&self) -> Result<Vec<AuthorRecord>> {
        Ok(sqlx::query_as::<_, AuthorRecord>("SELECT * FROM authors ORDER BY name")
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn create_publisher(&self, name: &str, address: &str, website: &str) -> Result<PublisherRecord> {
        let id = new_id();
        let now = now_utc();
        sqlx::query(
            "INSERT INTO publishers (id, name, address, website, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(address)
        .bind(website)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.get_publisher(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create publisher"))
    }

    pub async fn get_publisher(&self, id: &str) -> Result<Option<PublisherRecord>> {
        Ok(sqlx::query_as::<_, PublisherRecord>("SELECT * FROM publishers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_publishers(&self) -> Result<Vec<PublisherRecord>> {
        Ok(sqlx::query_as::<_, PublisherRecord>("SELECT * FROM publishers ORDER BY name")
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn create_faculty(&self, name: &str, code: &str, description: &str) -> Result<FacultyRecord> {
        let id = new_id();
        let now = now_utc();
        sqlx::query(
            "INSERT INTO faculties (id, name, code, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(code)
        .bind(description)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.get_faculty(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create faculty"))
    }

    pub async fn get_faculty(&self, id: &str) -> Result<Option<FacultyRecord>> {
        Ok(sqlx::query_as::<_, FacultyRecord>("SELECT * FROM faculties WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_faculties(&self) -> Result<Vec<FacultyRecord>> {
        Ok(sqlx::query_as::<_, FacultyRecord>("SELECT * FROM faculties ORDER BY name")
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn create_department(
        &self,
        name: &str,
        code: &str,
        description: &str,
        faculty_id: &str,
    ) -> Result<DepartmentRecord> {
        let id = new_id();
        let now = now_utc();
        sqlx::query(
            r#"
            INSERT INTO departments (id, name, code, description, faculty_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(code)
        .bind(description)
        .bind(faculty_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.get_department(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create department"))
    }

    pub async fn get_department(&self, id: &str) -> Result<Option<DepartmentRecord>> {
        Ok(sqlx::query_as::<_, DepartmentRecord>("SELECT * FROM departments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_departments(&self, faculty_id: Option<&str>) -> Result<Vec<DepartmentRecord>> {
        let departments = match faculty_id {
            Some(faculty_id) => {
                sqlx::query_as::<_, DepartmentRecord>(
                    "SELECT * FROM departments WHERE faculty_id = ? ORDER BY name",
                )
                .bind(faculty_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, DepartmentRecord>("SELECT * FROM departments ORDER BY name")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(departments)
    }

    pub async fn create_topic(
        &self,
        name: &str,
        code: &str,
        description: &str,
        department_id: &str,
    ) -> Result<TopicRecord> {
        let id = new_id();
        let now = now_utc();
        sqlx::query(
            r#"
            INSERT INTO topics (id, name, code, description, department_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(code)
        .bind(description)
        .bind(department_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.get_topic(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create topic"))
    }

    pub async fn get_topic(&self, id: &str) -> Result<Option<TopicRecord>> {
        Ok(sqlx::query_as::<_, TopicRecord>("SELECT * FROM topics WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_topics(&self, department_id: Option<&str>) -> Result<Vec<TopicRecord>> {
        let topics = match department_id {
            Some(department_id) => {
                sqlx::query_as::<_, TopicRecord>(
                    "SELECT * FROM topics WHERE department_id = ? ORDER BY name",
                )
                .bind(department_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, TopicRecord>("SELECT * FROM topics ORDER BY name")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(topics)
    }

    pub async fn create_genre(&self, name: &str, description: &str) -> Result<GenreRecord> {
        let id = new_id();
        let now = now_utc();
        sqlx::query(
            "INSERT INTO genres (id, name, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(description)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.get_genre(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create genre"))
    }

    pub async fn get_genre(&self, id: &str) -> Result<Option<GenreRecord>> {
        Ok(sqlx::query_as::<_, GenreRecord>("SELECT * FROM genres WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_genres(&self) -> Result<Vec<GenreRecord>> {
        Ok(sqlx::query_as::<_, GenreRecord>("SELECT * FROM genres ORDER BY name")
            .fetch_all(&self.pool)
            .await?)
    }

    // ========================================================================
    // Books
    // ========================================================================

    /// Create a book together with its author links
    pub async fn create_book(&self, book: CreateBook) -> Result<BookRecord> {
        let id = new_id();
        let now = now_utc();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO books (id, title, isbn, publisher_id, faculty_id, department_id, topic_id,
                genre_id, description, publication_date, edition, pages, language, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&book.title)
        .bind(&book.isbn)
        .bind(&book.publisher_id)
        .bind(&book.faculty_id)
        .bind(&book.department_id)
        .bind(&book.topic_id)
        .bind(&book.genre_id)
        .bind(&book.description)
        .bind(book.publication_date)
        .bind(&book.edition)
        .bind(book.pages)
        .bind(&book.language)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for author_id in &book.author_ids {
            sqlx::query("INSERT OR IGNORE INTO book_authors (book_id, author_id) VALUES (?, ?)")
                .bind(&id)
                .bind(author_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.get_book(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create book"))
    }

    pub async fn get_book(&self, id: &str) -> Result<Option<BookRecord>> {
        Ok(sqlx::query_as::<_, BookRecord>("SELECT * FROM books WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_book_by_isbn(&self, isbn: &str) -> Result<Option<BookRecord>> {
        Ok(sqlx::query_as::<_, BookRecord>("SELECT * FROM books WHERE isbn = ?")
            .bind(isbn)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn book_authors(&self, book_id: &str) -> Result<Vec<AuthorRecord>> {
        Ok(sqlx::query_as::<_, AuthorRecord>(
            r#"
            SELECT a.* FROM authors a
            JOIN book_authors ba ON ba.author_id = a.id
            WHERE ba.book_id = ?
            ORDER BY a.name
            "#,
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Search books, returning one page and the total match count
    pub async fn search_books(
        &self,
        filter: &BookFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<BookRecord>, i64)> {
        let (clause, params) = filter.to_sql();
        let from = r#"
            FROM books b
            LEFT JOIN publishers p ON p.id = b.publisher_id
            LEFT JOIN genres g ON g.id = b.genre_id
            WHERE 1 = 1"#;

        let count_sql = format!("SELECT COUNT(*) {}{}", from, clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for p in &params {
            count_query = count_query.bind(p);
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let data_sql = format!(
            "SELECT b.* {}{} ORDER BY b.title, b.id LIMIT ? OFFSET ?",
            from, clause
        );
        let mut data_query = sqlx::query_as::<_, BookRecord>(&data_sql);
        for p in &params {
            data_query = data_query.bind(p);
        }
        let books = data_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok((books, total))
    }

    /// Titles containing `term`, for search suggestions
    pub async fn suggest_titles(&self, term: &str, limit: i64) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar(
            r#"SELECT DISTINCT title FROM books WHERE title LIKE ? ESCAPE '\' ORDER BY title LIMIT ?"#,
        )
        .bind(like_pattern(term))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Author names containing `term`, for search suggestions
    pub async fn suggest_authors(&self, term: &str, limit: i64) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar(
            r#"SELECT DISTINCT name FROM authors WHERE name LIKE ? ESCAPE '\' ORDER BY name LIMIT ?"#,
        )
        .bind(like_pattern(term))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    // ========================================================================
    // Copies
    // ========================================================================

    pub async fn create_copy(&self, copy: CreateBookCopy) -> Result<BookCopyRecord> {
        let id = new_id();
        let now = now_utc();
        sqlx::query(
            r#"
            INSERT INTO book_copies (id, book_id, barcode, condition, status, acquisition_date, location, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'available', ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&copy.book_id)
        .bind(&copy.barcode)
        .bind(copy.condition)
        .bind(copy.acquisition_date)
        .bind(&copy.location)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.get_copy(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create book copy"))
    }

    pub async fn get_copy(&self, id: &str) -> Result<Option<BookCopyRecord>> {
        Ok(sqlx::query_as::<_, BookCopyRecord>("SELECT * FROM book_copies WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_copy_by_barcode(&self, barcode: &str) -> Result<Option<BookCopyRecord>> {
        Ok(sqlx::query_as::<_, BookCopyRecord>("SELECT * FROM book_copies WHERE barcode = ?")
            .bind(barcode)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn copies_for_book(&self, book_id: &str) -> Result<Vec<BookCopyRecord>> {
        Ok(sqlx::query_as::<_, BookCopyRecord>(
            "SELECT * FROM book_copies WHERE book_id = ? ORDER BY barcode",
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// First available copy of a book, by barcode
    pub async fn first_available_copy(&self, book_id: &str) -> Result<Option<BookCopyRecord>> {
        Ok(sqlx::query_as::<_, BookCopyRecord>(
            "SELECT * FROM book_copies WHERE book_id = ? AND status = 'available' ORDER BY barcode LIMIT 1",
        )
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// (total, available) copy counts for a book
    pub async fn copy_counts(&self, book_id: &str) -> Result<(i64, i64)> {
        let counts: (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(CASE WHEN status = 'available' THEN 1 ELSE 0 END), 0)
            FROM book_copies WHERE book_id = ?
            "#,
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(counts)
    }

    pub async fn set_copy_status(&self, id: &str, status: CopyStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE book_copies SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(now_utc())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_copy_condition(&self, id: &str, condition: CopyCondition) -> Result<bool> {
        let result = sqlx::query("UPDATE book_copies SET condition = ?, updated_at = ? WHERE id = ?")
            .bind(condition)
            .bind(now_utc())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
