//! Digital repository: collections, eBooks and per-user access permissions

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool, Transaction};

use super::sqlite_helpers::{like_pattern, new_id, now_utc};

// ============================================================================
// Enums
// ============================================================================

/// Visibility tier of an eBook
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    sqlx::Type,
    async_graphql::Enum,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AccessLevel {
    #[default]
    Open,
    Restricted,
    Embargo,
    Private,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, async_graphql::Enum,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PermissionRequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CollectionRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub curator_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EBookRecord {
    pub id: String,
    pub title: String,
    pub authors: String,
    pub abstract_text: String,
    pub file_path: String,
    pub access_level: AccessLevel,
    pub doi: Option<String>,
    pub collection_id: Option<String>,
    pub uploaded_by: String,
    pub upload_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateEBook {
    pub title: String,
    pub authors: String,
    pub abstract_text: String,
    pub file_path: String,
    pub access_level: AccessLevel,
    pub doi: Option<String>,
    pub collection_id: Option<String>,
    pub uploaded_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EBookPermissionRecord {
    pub id: String,
    pub ebook_id: String,
    pub user_id: String,
    pub granted: bool,
    pub granted_by: Option<String>,
    pub granted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PermissionRequestRecord {
    pub id: String,
    pub ebook_id: String,
    pub user_id: String,
    pub reason: String,
    pub status: PermissionRequestStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Which eBooks a listing may return
#[derive(Debug, Clone)]
pub enum EBookScope {
    /// Every eBook regardless of access level
    All,
    /// Open eBooks plus those the given user holds a granted permission for
    AccessibleTo(Option<String>),
}

// ============================================================================
// Repository
// ============================================================================

pub struct EBooksRepository {
    pool: SqlitePool,
}

impl EBooksRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Collections
    // ========================================================================

    pub async fn create_collection(
        &self,
        name: &str,
        description: &str,
        curator_id: Option<&str>,
    ) -> Result<CollectionRecord> {
        let id = new_id();
        let now = now_utc();
        sqlx::query(
            "INSERT INTO collections (id, name, description, curator_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(description)
        .bind(curator_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.get_collection(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create collection"))
    }

    pub async fn get_collection(&self, id: &str) -> Result<Option<CollectionRecord>> {
        Ok(sqlx::query_as::<_, CollectionRecord>("SELECT * FROM collections WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_collections(&self) -> Result<Vec<CollectionRecord>> {
        Ok(sqlx::query_as::<_, CollectionRecord>("SELECT * FROM collections ORDER BY name")
            .fetch_all(&self.pool)
            .await?)
    }

    // ========================================================================
    // eBooks
    // ========================================================================

    pub async fn create_ebook(&self, ebook: CreateEBook) -> Result<EBookRecord> {
        let id = new_id();
        let now = now_utc();
        sqlx::query(
            r#"
            INSERT INTO ebooks (id, title, authors, abstract_text, file_path, access_level, doi,
                collection_id, uploaded_by, upload_date, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&ebook.title)
        .bind(&ebook.authors)
        .bind(&ebook.abstract_text)
        .bind(&ebook.file_path)
        .bind(ebook.access_level)
        .bind(&ebook.doi)
        .bind(&ebook.collection_id)
        .bind(&ebook.uploaded_by)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.get_ebook(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create ebook"))
    }

    pub async fn get_ebook(&self, id: &str) -> Result<Option<EBookRecord>> {
        Ok(sqlx::query_as::<_, EBookRecord>("SELECT * FROM ebooks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn doi_taken(&self, doi: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ebooks WHERE doi = ? COLLATE NOCASE")
            .bind(doi)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn set_access_level(&self, id: &str, level: AccessLevel) -> Result<bool> {
        let result = sqlx::query("UPDATE ebooks SET access_level = ?, updated_at = ? WHERE id = ?")
            .bind(level)
            .bind(now_utc())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List eBooks in scope, optionally matching title, authors or abstract
    pub async fn list_ebooks(
        &self,
        scope: &EBookScope,
        search: Option<&str>,
        limit: i64,
    ) -> Result<Vec<EBookRecord>> {
        let mut sql = String::from("SELECT e.* FROM ebooks e WHERE 1 = 1");
        let mut params: Vec<String> = Vec::new();

        if let EBookScope::AccessibleTo(user_id) = scope {
            match user_id {
                Some(user_id) => {
                    sql.push_str(
                        r#" AND (e.access_level = 'open' OR EXISTS (
                            SELECT 1 FROM ebook_permissions p
                            WHERE p.ebook_id = e.id AND p.user_id = ? AND p.granted = 1))"#,
                    );
                    params.push(user_id.clone());
                }
                None => sql.push_str(" AND e.access_level = 'open'"),
            }
        }
        if let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) {
            sql.push_str(
                r#" AND (e.title LIKE ? ESCAPE '\' OR e.authors LIKE ? ESCAPE '\' OR e.abstract_text LIKE ? ESCAPE '\')"#,
            );
            params.extend(std::iter::repeat_n(like_pattern(term), 3));
        }
        sql.push_str(" ORDER BY e.upload_date DESC, e.title LIMIT ?");

        let mut query = sqlx::query_as::<_, EBookRecord>(&sql);
        for p in &params {
            query = query.bind(p);
        }
        Ok(query.bind(limit).fetch_all(&self.pool).await?)
    }

    /// Titles of open or permitted eBooks containing `term`
    pub async fn suggest_titles(&self, term: &str, user_id: Option<&str>, limit: i64) -> Result<Vec<String>> {
        let scope = EBookScope::AccessibleTo(user_id.map(str::to_string));
        let ebooks = self.list_ebooks(&scope, Some(term), limit).await?;
        Ok(ebooks.into_iter().map(|e| e.title).collect())
    }

    pub async fn count(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM ebooks")
            .fetch_one(&self.pool)
            .await?)
    }

    // ========================================================================
    // Permissions
    // ========================================================================

    pub async fn has_granted_permission(&self, ebook_id: &str, user_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM ebook_permissions WHERE ebook_id = ? AND user_id = ? AND granted = 1",
        )
        .bind(ebook_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn get_permission(&self, ebook_id: &str, user_id: &str) -> Result<Option<EBookPermissionRecord>> {
        Ok(sqlx::query_as::<_, EBookPermissionRecord>(
            "SELECT * FROM ebook_permissions WHERE ebook_id = ? AND user_id = ?",
        )
        .bind(ebook_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn list_permissions(&self, ebook_id: &str) -> Result<Vec<EBookPermissionRecord>> {
        Ok(sqlx::query_as::<_, EBookPermissionRecord>(
            "SELECT * FROM ebook_permissions WHERE ebook_id = ? ORDER BY created_at",
        )
        .bind(ebook_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Create or update the single permission row for (ebook, user) as granted
    pub async fn grant_permission(
        &self,
        ebook_id: &str,
        user_id: &str,
        granted_by: &str,
    ) -> Result<EBookPermissionRecord> {
        let mut tx = self.pool.begin().await?;
        Self::grant_in(&mut tx, ebook_id, user_id, granted_by).await?;
        tx.commit().await?;

        self.get_permission(ebook_id, user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to grant permission"))
    }

    async fn grant_in(
        tx: &mut Transaction<'_, Sqlite>,
        ebook_id: &str,
        user_id: &str,
        granted_by: &str,
    ) -> Result<()> {
        let now = now_utc();
        sqlx::query(
            r#"
            INSERT INTO ebook_permissions (id, ebook_id, user_id, granted, granted_by, granted_at, created_at, updated_at)
            VALUES (?, ?, ?, 1, ?, ?, ?, ?)
            ON CONFLICT (ebook_id, user_id) DO UPDATE SET
                granted = 1,
                granted_by = excluded.granted_by,
                granted_at = excluded.granted_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(new_id())
        .bind(ebook_id)
        .bind(user_id)
        .bind(granted_by)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Withdraw a granted permission; returns false if none was granted
    pub async fn revoke_permission(&self, ebook_id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE ebook_permissions SET granted = 0, updated_at = ? WHERE ebook_id = ? AND user_id = ? AND granted = 1",
        )
        .bind(now_utc())
        .bind(ebook_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Permission Requests
    // ========================================================================

    /// File a pending request unless one is already pending for (ebook, user).
    /// Returns `None` on duplicate.
    pub async fn create_request_if_none_pending(
        &self,
        ebook_id: &str,
        user_id: &str,
        reason: &str,
    ) -> Result<Option<PermissionRequestRecord>> {
        let id = new_id();
        let now = now_utc();
        let result = sqlx::query(
            r#"
            INSERT INTO ebook_permission_requests (id, ebook_id, user_id, reason, status, created_at, updated_at)
            SELECT ?, ?, ?, ?, 'pending', ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM ebook_permission_requests
                WHERE ebook_id = ? AND user_id = ? AND status = 'pending'
            )
            "#,
        )
        .bind(&id)
        .bind(ebook_id)
        .bind(user_id)
        .bind(reason)
        .bind(now)
        .bind(now)
        .bind(ebook_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_request(&id).await
    }

    pub async fn get_request(&self, id: &str) -> Result<Option<PermissionRequestRecord>> {
        Ok(sqlx::query_as::<_, PermissionRequestRecord>(
            "SELECT * FROM ebook_permission_requests WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn list_requests(
        &self,
        user_id: Option<&str>,
        status: Option<PermissionRequestStatus>,
    ) -> Result<Vec<PermissionRequestRecord>> {
        let mut sql = String::from("SELECT * FROM ebook_permission_requests WHERE 1 = 1");
        if user_id.is_some() {
            sql.push_str(" AND user_id = ?");
        }
        if status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut query = sqlx::query_as::<_, PermissionRequestRecord>(&sql);
        if let Some(user_id) = user_id {
            query = query.bind(user_id);
        }
        if let Some(status) = status {
            query = query.bind(status);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    /// Approve a pending request and grant the permission in one transaction.
    /// Returns false when the request was no longer pending.
    pub async fn approve_request(
        &self,
        request: &PermissionRequestRecord,
        reviewer_id: &str,
        notes: &str,
    ) -> Result<bool> {
        let now = now_utc();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE ebook_permission_requests
            SET status = 'approved', reviewed_by = ?, reviewed_at = ?, review_notes = ?, updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(reviewer_id)
        .bind(now)
        .bind(notes)
        .bind(now)
        .bind(&request.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        Self::grant_in(&mut tx, &request.ebook_id, &request.user_id, reviewer_id).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Move a pending request to rejected or cancelled
    pub async fn close_request(
        &self,
        id: &str,
        status: PermissionRequestStatus,
        reviewer_id: Option<&str>,
        notes: &str,
    ) -> Result<bool> {
        let now = now_utc();
        let reviewed_at = reviewer_id.map(|_| now);
        let result = sqlx::query(
            r#"
            UPDATE ebook_permission_requests
            SET status = ?, reviewed_by = COALESCE(?, reviewed_by), reviewed_at = COALESCE(?, reviewed_at),
                review_notes = ?, updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(status)
        .bind(reviewer_id)
        .bind(reviewed_at)
        .bind(notes)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
