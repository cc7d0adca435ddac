//! Database connection and repositories
//!
//! Re-exports are provided for convenience, even if not all are used within the crate.

#![allow(unused_imports)]

pub mod analytics;
pub mod attendance;
pub mod catalog;
pub mod content;
pub mod ebooks;
pub mod loan_requests;
pub mod loans;
pub mod notifications;
pub mod reservations;
pub mod schema;
pub mod sqlite_helpers;
pub mod study_rooms;
pub mod users;

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub use analytics::{
    AnalyticsEventRecord, AnalyticsRepository, CreateAnalyticsEvent, DailyStatsRecord, EventType,
    ItemType, PopularItemRecord, SystemHealthRecord,
};
pub use attendance::{
    AttendanceFilter, AttendanceRecord, AttendanceRepository, AttendanceStatus, CreateAttendance,
};
pub use catalog::{
    AuthorRecord, BookCopyRecord, BookFilter, BookRecord, CatalogRepository, CopyCondition,
    CopyStatus, CreateBook, CreateBookCopy, DepartmentRecord, FacultyRecord, GenreRecord,
    PublisherRecord, TopicRecord,
};
pub use content::{
    BlogPostRecord, ContentRepository, CreateEvent, EventRecord, EventRegistrationRecord,
    PostStatus, RegisterOutcome,
};
pub use ebooks::{
    AccessLevel, CollectionRecord, CreateEBook, EBookPermissionRecord, EBookRecord, EBookScope,
    EBooksRepository, PermissionRequestRecord, PermissionRequestStatus,
};
pub use loan_requests::{
    ApproveOutcome, LoanRequestRecord, LoanRequestStatus, LoanRequestsRepository,
};
pub use loans::{
    FineRecord, FineStatus, LoanFilter, LoanRecord, LoanStatus, LoansRepository, NewFine,
};
pub use notifications::{
    CreateNotification, NotificationCategory, NotificationRecord, NotificationRepository,
};
pub use reservations::{ReservationRecord, ReservationStatus, ReservationsRepository};
pub use study_rooms::{
    BookingFilter, BookingRecord, BookingStatus, CreateBooking, CreateRoom, RoomType,
    StudyRoomRecord, StudyRoomsRepository, UpdateRoom,
};
pub use users::{
    CreateUser, MembershipType, Role, UniqueField, UpdateProfile, UserFilter, UserRecord,
    UsersRepository,
};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the SQLite database at `url` and bootstrap the schema
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL: {}", url))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        if let Some(dir) = options
            .get_filename()
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create database directory {}", dir.display()))?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", url))?;

        let db = Self { pool };
        db.bootstrap().await?;
        Ok(db)
    }

    /// Private in-memory database with the full schema, used by tests
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // A single connection that never recycles keeps the in-memory data alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.bootstrap().await?;
        Ok(db)
    }

    async fn bootstrap(&self) -> Result<()> {
        let result = schema::ensure_schema(&self.pool).await?;
        if !result.tables_created.is_empty() {
            tracing::info!(
                tables = result.tables_created.len(),
                "Database schema created"
            );
        }
        if !result.errors.is_empty() {
            anyhow::bail!("Schema bootstrap failed: {}", result.errors.join("; "));
        }
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Round-trip a trivial query, used by readiness and health checks
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Get the users repository
    pub fn users(&self) -> UsersRepository {
        UsersRepository::new(self.pool.clone())
    }

    /// Get the notifications repository
    pub fn notifications(&self) -> NotificationRepository {
        NotificationRepository::new(self.pool.clone())
    }

    /// Get the study rooms repository
    pub fn study_rooms(&self) -> StudyRoomsRepository {
        StudyRoomsRepository::new(self.pool.clone())
    }

    /// Get the catalog repository
    pub fn catalog(&self) -> CatalogRepository {
        CatalogRepository::new(self.pool.clone())
    }

    /// Get the loans and fines repository
    pub fn loans(&self) -> LoansRepository {
        LoansRepository::new(self.pool.clone())
    }

    /// Get the reservations repository
    pub fn reservations(&self) -> ReservationsRepository {
        ReservationsRepository::new(self.pool.clone())
    }

    /// Get the loan requests repository
    pub fn loan_requests(&self) -> LoanRequestsRepository {
        LoanRequestsRepository::new(self.pool.clone())
    }

    /// Get the attendance repository
    pub fn attendance(&self) -> AttendanceRepository {
        AttendanceRepository::new(self.pool.clone())
    }

    /// Get the digital repository (collections and eBooks)
    pub fn ebooks(&self) -> EBooksRepository {
        EBooksRepository::new(self.pool.clone())
    }

    /// Get the analytics repository
    pub fn analytics(&self) -> AnalyticsRepository {
        AnalyticsRepository::new(self.pool.clone())
    }

    /// Get the blog and events repository
    pub fn content(&self) -> ContentRepository {
        ContentRepository::new(self.pool.clone())
    }
}
