//! Loans and fines repository
//!
//! Checkout, return and loss are written together with the copy status in
//! one transaction so a copy is never lent twice.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool, Transaction};

use super::catalog::CopyStatus;
use super::sqlite_helpers::{new_id, now_utc};

// ============================================================================
// Enums
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, async_graphql::Enum,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Returned,
    Overdue,
    Lost,
}

impl LoanStatus {
    /// The book is still with the patron
    pub fn is_open(&self) -> bool {
        matches!(self, LoanStatus::Active | LoanStatus::Overdue)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, async_graphql::Enum,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum FineStatus {
    Unpaid,
    Paid,
    Waived,
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoanRecord {
    pub id: String,
    pub user_id: String,
    pub book_copy_id: String,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub renewal_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FineRecord {
    pub id: String,
    pub loan_id: String,
    /// Decimal amount as text, e.g. `"300.00"`
    pub amount: String,
    pub reason: String,
    pub status: FineStatus,
    pub paid_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct LoanFilter {
    pub user_id: Option<String>,
    pub status: Option<LoanStatus>,
    pub book_copy_id: Option<String>,
}

/// Fine to record alongside a return
#[derive(Debug, Clone)]
pub struct NewFine {
    pub amount: String,
    pub reason: String,
}

// ============================================================================
// Repository
// ============================================================================

pub struct LoansRepository {
    pool: SqlitePool,
}

impl LoansRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Loans
    // ========================================================================

    /// Lend a copy: flips it from available to checked out and inserts the
    /// loan in the same transaction. Returns `None` when the copy was not
    /// available.
    pub async fn checkout(
        &self,
        user_id: &str,
        book_copy_id: &str,
        loan_date: DateTime<Utc>,
        due_date: DateTime<Utc>,
    ) -> Result<Option<LoanRecord>> {
        let mut tx = self.pool.begin().await?;
        let id = Self::checkout_in(&mut tx, user_id, book_copy_id, loan_date, due_date).await?;
        tx.commit().await?;

        match id {
            Some(id) => self.get(&id).await,
            None => Ok(None),
        }
    }

    /// Checkout step usable inside a caller's transaction
    pub async fn checkout_in(
        tx: &mut Transaction<'_, Sqlite>,
        user_id: &str,
        book_copy_id: &str,
        loan_date: DateTime<Utc>,
        due_date: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let now = now_utc();
        let claimed = sqlx::query(
            "UPDATE book_copies SET status = 'checked_out', updated_at = ? WHERE id = ? AND status = 'available'",
        )
        .bind(now)
        .bind(book_copy_id)
        .execute(&mut **tx)
        .await?;

        if claimed.rows_affected() == 0 {
            return Ok(None);
        }

        let id = new_id();
        sqlx::query(
            r#"
            INSERT INTO loans (id, user_id, book_copy_id, loan_date, due_date, status, renewal_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'active', 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(book_copy_id)
        .bind(loan_date)
        .bind(due_date)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        Ok(Some(id))
    }

    pub async fn get(&self, id: &str) -> Result<Option<LoanRecord>> {
        Ok(sqlx::query_as::<_, LoanRecord>("SELECT * FROM loans WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list(&self, filter: &LoanFilter) -> Result<Vec<LoanRecord>> {
        let mut sql = String::from("SELECT * FROM loans WHERE 1 = 1");
        if filter.user_id.is_some() {
            sql.push_str(" AND user_id = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.book_copy_id.is_some() {
            sql.push_str(" AND book_copy_id = ?");
        }
        sql.push_str(" ORDER BY loan_date DESC");

        let mut query = sqlx::query_as::<_, LoanRecord>(&sql);
        if let Some(ref user_id) = filter.user_id {
            query = query.bind(user_id);
        }
        if let Some(status) = filter.status {
            query = query.bind(status);
        }
        if let Some(ref copy_id) = filter.book_copy_id {
            query = query.bind(copy_id);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    /// Whether the user currently holds any copy of the book
    pub async fn has_open_loan_for_book(&self, user_id: &str, book_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM loans l
            JOIN book_copies c ON c.id = l.book_copy_id
            WHERE l.user_id = ? AND c.book_id = ? AND l.status IN ('active', 'overdue')
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Close an open loan, free the copy and optionally record a fine
    pub async fn complete_return(
        &self,
        id: &str,
        book_copy_id: &str,
        returned_at: DateTime<Utc>,
        fine: Option<NewFine>,
    ) -> Result<Option<FineRecord>> {
        let now = now_utc();
        let mut tx = self.pool.begin().await?;

        let closed = sqlx::query(
            r#"
            UPDATE loans SET status = 'returned', return_date = ?, updated_at = ?
            WHERE id = ? AND status IN ('active', 'overdue')
            "#,
        )
        .bind(returned_at)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if closed.rows_affected() == 0 {
            anyhow::bail!("Loan {} is not open", id);
        }

        sqlx::query("UPDATE book_copies SET status = ?, updated_at = ? WHERE id = ?")
            .bind(CopyStatus::Available)
            .bind(now)
            .bind(book_copy_id)
            .execute(&mut *tx)
            .await?;

        let fine_id = match fine {
            Some(fine) => {
                let fine_id = new_id();
                sqlx::query(
                    r#"
                    INSERT INTO fines (id, loan_id, amount, reason, status, created_at, updated_at)
                    VALUES (?, ?, ?, ?, 'unpaid', ?, ?)
                    "#,
                )
                .bind(&fine_id)
                .bind(id)
                .bind(&fine.amount)
                .bind(&fine.reason)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                Some(fine_id)
            }
            None => None,
        };

        tx.commit().await?;

        match fine_id {
            Some(fine_id) => self.get_fine(&fine_id).await,
            None => Ok(None),
        }
    }

    /// Extend an active loan if it still has renewals left
    pub async fn renew(
        &self,
        id: &str,
        new_due_date: DateTime<Utc>,
        max_renewals: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE loans SET due_date = ?, renewal_count = renewal_count + 1, updated_at = ?
            WHERE id = ? AND status = 'active' AND renewal_count < ?
            "#,
        )
        .bind(new_due_date)
        .bind(now_utc())
        .bind(id)
        .bind(max_renewals)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark an open loan and its copy as lost
    pub async fn mark_lost(&self, id: &str, book_copy_id: &str) -> Result<bool> {
        let now = now_utc();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE loans SET status = 'lost', updated_at = ? WHERE id = ? AND status IN ('active', 'overdue')",
        )
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("UPDATE book_copies SET status = ?, updated_at = ? WHERE id = ?")
            .bind(CopyStatus::Lost)
            .bind(now)
            .bind(book_copy_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Flag every active loan whose due date has passed
    pub async fn mark_overdue(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE loans SET status = 'overdue', updated_at = ? WHERE status = 'active' AND due_date < ?",
        )
        .bind(now_utc())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Loans of a user that are due within the window
    pub async fn due_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LoanRecord>> {
        Ok(sqlx::query_as::<_, LoanRecord>(
            r#"
            SELECT * FROM loans
            WHERE user_id = ? AND status = 'active' AND due_date >= ? AND due_date <= ?
            ORDER BY due_date
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Count loans by status
    pub async fn count_by_status(&self, status: LoanStatus) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE status = ?")
            .bind(status)
            .fetch_one(&self.pool)
            .await?)
    }

    // ========================================================================
    // Fines
    // ========================================================================

    pub async fn get_fine(&self, id: &str) -> Result<Option<FineRecord>> {
        Ok(sqlx::query_as::<_, FineRecord>("SELECT * FROM fines WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Fines owed by a user (through their loans), newest first
    pub async fn fines_for_user(&self, user_id: &str, status: Option<FineStatus>) -> Result<Vec<FineRecord>> {
        let fines = match status {
            Some(status) => {
                sqlx::query_as::<_, FineRecord>(
                    r#"
                    SELECT f.* FROM fines f JOIN loans l ON l.id = f.loan_id
                    WHERE l.user_id = ? AND f.status = ?
                    ORDER BY f.created_at DESC
                    "#,
                )
                .bind(user_id)
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, FineRecord>(
                    r#"
                    SELECT f.* FROM fines f JOIN loans l ON l.id = f.loan_id
                    WHERE l.user_id = ?
                    ORDER BY f.created_at DESC
                    "#,
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(fines)
    }

    pub async fn list_fines(&self, status: Option<FineStatus>) -> Result<Vec<FineRecord>> {
        let fines = match status {
            Some(status) => {
                sqlx::query_as::<_, FineRecord>(
                    "SELECT * FROM fines WHERE status = ? ORDER BY created_at DESC",
                )
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, FineRecord>("SELECT * FROM fines ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(fines)
    }

    pub async fn has_unpaid_fines(&self, user_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM fines f JOIN loans l ON l.id = f.loan_id
            WHERE l.user_id = ? AND f.status = 'unpaid'
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Settle an unpaid fine as paid or waived
    pub async fn settle_fine(&self, id: &str, status: FineStatus) -> Result<bool> {
        let now = now_utc();
        let paid_date = (status == FineStatus::Paid).then_some(now);
        let result = sqlx::query(
            "UPDATE fines SET status = ?, paid_date = ?, updated_at = ? WHERE id = ? AND status = 'unpaid'",
        )
        .bind(status)
        .bind(paid_date)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Amounts of all unpaid fines, as stored text
    pub async fn unpaid_amounts(&self, user_id: Option<&str>) -> Result<Vec<String>> {
        let amounts = match user_id {
            Some(user_id) => {
                sqlx::query_scalar(
                    r#"
                    SELECT f.amount FROM fines f JOIN loans l ON l.id = f.loan_id
                    WHERE l.user_id = ? AND f.status = 'unpaid'
                    "#,
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT amount FROM fines WHERE status = 'unpaid'")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(amounts)
    }
}
