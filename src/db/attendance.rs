//! Library attendance (visitor check-in / check-out) repository

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::sqlite_helpers::{like_pattern, new_id, now_utc};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, async_graphql::Enum,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Active,
    CheckedOut,
}

impl AttendanceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            AttendanceStatus::Active => "Active",
            AttendanceStatus::CheckedOut => "Checked Out",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttendanceRecord {
    pub id: String,
    pub user_id: Option<String>,
    pub registration_number: String,
    pub full_name: String,
    pub department: String,
    pub faculty: String,
    pub phone: String,
    pub purpose: String,
    pub check_in: DateTime<Utc>,
    pub check_out: Option<DateTime<Utc>>,
    pub status: AttendanceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttendanceRecord {
    /// Minutes spent in the library, once checked out
    pub fn duration_minutes(&self) -> Option<i64> {
        self.check_out.map(|out| (out - self.check_in).num_minutes())
    }
}

#[derive(Debug, Clone)]
pub struct CreateAttendance {
    pub user_id: Option<String>,
    pub registration_number: String,
    pub full_name: String,
    pub department: String,
    pub faculty: String,
    pub phone: String,
    pub purpose: String,
}

#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter {
    pub user_id: Option<String>,
    pub status: Option<AttendanceStatus>,
    pub date: Option<NaiveDate>,
    pub search: Option<String>,
}

pub struct AttendanceRepository {
    pool: SqlitePool,
}

impl AttendanceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn check_in(&self, input: CreateAttendance, at: DateTime<Utc>) -> Result<AttendanceRecord> {
        let id = new_id();
        let now = now_utc();

        sqlx::query(
            r#"
            INSERT INTO attendance (id, user_id, registration_number, full_name, department, faculty,
                phone, purpose, check_in, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&input.user_id)
        .bind(&input.registration_number)
        .bind(&input.full_name)
        .bind(&input.department)
        .bind(&input.faculty)
        .bind(&input.phone)
        .bind(&input.purpose)
        .bind(at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create attendance record"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<AttendanceRecord>> {
        Ok(sqlx::query_as::<_, AttendanceRecord>("SELECT * FROM attendance WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Whether the user already has an open visit
    pub async fn has_active_for_user(&self, user_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM attendance WHERE user_id = ? AND status = 'active'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Close an active visit; returns false if it was not active
    pub async fn check_out(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE attendance SET status = 'checked_out', check_out = ?, updated_at = ? WHERE id = ? AND status = 'active'",
        )
        .bind(at)
        .bind(now_utc())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list(&self, filter: &AttendanceFilter) -> Result<Vec<AttendanceRecord>> {
        let mut sql = String::from("SELECT * FROM attendance WHERE 1 = 1");
        let mut params: Vec<String> = Vec::new();

        if let Some(ref user_id) = filter.user_id {
            sql.push_str(" AND user_id = ?");
            params.push(user_id.clone());
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            params.push(
                match status {
                    AttendanceStatus::Active => "active",
                    AttendanceStatus::CheckedOut => "checked_out",
                }
                .to_string(),
            );
        }
        if let Some(date) = filter.date {
            sql.push_str(" AND date(check_in) = ?");
            params.push(date.format("%Y-%m-%d").to_string());
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            sql.push_str(
                r#" AND (full_name LIKE ? ESCAPE '\' OR registration_number LIKE ? ESCAPE '\' OR department LIKE ? ESCAPE '\')"#,
            );
            let pattern = like_pattern(search);
            params.extend(std::iter::repeat_n(pattern, 3));
        }
        sql.push_str(" ORDER BY check_in DESC");

        let mut query = sqlx::query_as::<_, AttendanceRecord>(&sql);
        for p in &params {
            query = query.bind(p);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    pub async fn count_active(&self) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM attendance WHERE status = 'active'")
                .fetch_one(&self.pool)
                .await?,
        )
    }
}
