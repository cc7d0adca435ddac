//! Loan requests repository
//!
//! Requests only ever leave `pending` through a conditional update, so a
//! request reaches exactly one terminal status.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::loans::LoansRepository;
use super::sqlite_helpers::{new_id, now_utc};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, async_graphql::Enum,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LoanRequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Expired,
}

impl LoanRequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoanRequestStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoanRequestRecord {
    pub id: String,
    pub user_id: String,
    pub book_copy_id: String,
    pub request_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub status: LoanRequestStatus,
    pub approval_date: Option<DateTime<Utc>>,
    pub rejection_date: Option<DateTime<Utc>>,
    pub processed_by: Option<String>,
    pub notes: String,
    pub loan_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of trying to approve a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApproveOutcome {
    Approved { loan_id: String },
    NotPending,
    CopyUnavailable,
}

pub struct LoanRequestsRepository {
    pool: SqlitePool,
}

impl LoanRequestsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: &str,
        book_copy_id: &str,
        request_date: DateTime<Utc>,
        expiry_date: DateTime<Utc>,
        notes: &str,
    ) -> Result<LoanRequestRecord> {
        let id = new_id();
        let now = now_utc();

        sqlx::query(
            r#"
            INSERT INTO loan_requests (id, user_id, book_copy_id, request_date, expiry_date, status, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'pending', ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(book_copy_id)
        .bind(request_date)
        .bind(expiry_date)
        .bind(notes)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create loan request"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<LoanRequestRecord>> {
        Ok(sqlx::query_as::<_, LoanRequestRecord>("SELECT * FROM loan_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list(
        &self,
        user_id: Option<&str>,
        status: Option<LoanRequestStatus>,
    ) -> Result<Vec<LoanRequestRecord>> {
        let mut sql = String::from("SELECT * FROM loan_requests WHERE 1 = 1");
        if user_id.is_some() {
            sql.push_str(" AND user_id = ?");
        }
        if status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY request_date DESC");

        let mut query = sqlx::query_as::<_, LoanRequestRecord>(&sql);
        if let Some(user_id) = user_id {
            query = query.bind(user_id);
        }
        if let Some(status) = status {
            query = query.bind(status);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    /// Whether the user has a pending request for any copy of the book
    pub async fn has_pending_for_book(&self, user_id: &str, book_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM loan_requests r
            JOIN book_copies c ON c.id = r.book_copy_id
            WHERE r.user_id = ? AND c.book_id = ? AND r.status = 'pending'
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Approve a pending request: lends the copy and links the loan, all in
    /// one transaction.
    pub async fn approve(
        &self,
        id: &str,
        processed_by: &str,
        user_id: &str,
        book_copy_id: &str,
        now: DateTime<Utc>,
        due_date: DateTime<Utc>,
    ) -> Result<ApproveOutcome> {
        let mut tx = self.pool.begin().await?;

        let status: Option<LoanRequestStatus> =
            sqlx::query_scalar("SELECT status FROM loan_requests WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if status != Some(LoanRequestStatus::Pending) {
            return Ok(ApproveOutcome::NotPending);
        }

        let Some(loan_id) =
            LoansRepository::checkout_in(&mut tx, user_id, book_copy_id, now, due_date).await?
        else {
            return Ok(ApproveOutcome::CopyUnavailable);
        };

        let result = sqlx::query(
            r#"
            UPDATE loan_requests SET status = 'approved', approval_date = ?, processed_by = ?,
                loan_id = ?, updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(now)
        .bind(processed_by)
        .bind(&loan_id)
        .bind(now_utc())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(ApproveOutcome::NotPending);
        }

        tx.commit().await?;
        Ok(ApproveOutcome::Approved { loan_id })
    }

    /// Move a pending request to rejected, cancelled or expired
    pub async fn close(
        &self,
        id: &str,
        status: LoanRequestStatus,
        processed_by: Option<&str>,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let rejection_date = (status == LoanRequestStatus::Rejected).then_some(now);
        let result = sqlx::query(
            r#"
            UPDATE loan_requests SET status = ?, rejection_date = COALESCE(?, rejection_date),
                processed_by = COALESCE(?, processed_by), notes = COALESCE(?, notes), updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(status)
        .bind(rejection_date)
        .bind(processed_by)
        .bind(notes)
        .bind(now_utc())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Expire every pending request past its expiry date
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<Vec<LoanRequestRecord>> {
        let expired = sqlx::query_as::<_, LoanRequestRecord>(
            r#"
            UPDATE loan_requests SET status = 'expired', updated_at = ?
            WHERE status = 'pending' AND expiry_date < ?
            RETURNING *
            "#,
        )
        .bind(now_utc())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(expired)
    }

    pub async fn count_pending(&self) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM loan_requests WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?,
        )
    }
}
