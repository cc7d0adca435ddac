//! Book reservations repository

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::sqlite_helpers::{new_id, now_utc};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, async_graphql::Enum,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Fulfilled,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReservationRecord {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    pub reservation_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct ReservationsRepository {
    pool: SqlitePool,
}

impl ReservationsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an active reservation unless the user already holds one for the book.
    /// Returns `None` on duplicate.
    pub async fn create_if_none_active(
        &self,
        user_id: &str,
        book_id: &str,
        reservation_date: DateTime<Utc>,
        expiry_date: DateTime<Utc>,
    ) -> Result<Option<ReservationRecord>> {
        let id = new_id();
        let now = now_utc();

        let result = sqlx::query(
            r#"
            INSERT INTO reservations (id, user_id, book_id, reservation_date, expiry_date, status, created_at, updated_at)
            SELECT ?, ?, ?, ?, ?, 'active', ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM reservations WHERE user_id = ? AND book_id = ? AND status = 'active'
            )
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(book_id)
        .bind(reservation_date)
        .bind(expiry_date)
        .bind(now)
        .bind(now)
        .bind(user_id)
        .bind(book_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(&id).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<ReservationRecord>> {
        Ok(sqlx::query_as::<_, ReservationRecord>("SELECT * FROM reservations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list(
        &self,
        user_id: Option<&str>,
        status: Option<ReservationStatus>,
    ) -> Result<Vec<ReservationRecord>> {
        let mut sql = String::from("SELECT * FROM reservations WHERE 1 = 1");
        if user_id.is_some() {
            sql.push_str(" AND user_id = ?");
        }
        if status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY reservation_date DESC");

        let mut query = sqlx::query_as::<_, ReservationRecord>(&sql);
        if let Some(user_id) = user_id {
            query = query.bind(user_id);
        }
        if let Some(status) = status {
            query = query.bind(status);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    /// Move an active reservation to a terminal status
    pub async fn close(&self, id: &str, status: ReservationStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE reservations SET status = ?, updated_at = ? WHERE id = ? AND status = 'active'",
        )
        .bind(status)
        .bind(now_utc())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Expire every active reservation past its expiry date
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE reservations SET status = 'expired', updated_at = ? WHERE status = 'active' AND expiry_date < ?",
        )
        .bind(now_utc())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_active(&self, user_id: &str) -> Result<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE user_id = ? AND status = 'active'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?)
    }
}
