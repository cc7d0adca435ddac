//! Study rooms and bookings repository

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::sqlite_helpers::{new_id, now_utc};

// ============================================================================
// Enums
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, async_graphql::Enum,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum RoomType {
    Individual,
    Group,
    Conference,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, async_graphql::Enum,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Rejected,
    Completed,
}

impl BookingStatus {
    /// Statuses that hold the slot
    pub const HOLDING: [BookingStatus; 2] = [BookingStatus::Pending, BookingStatus::Confirmed];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Completed => "completed",
        }
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StudyRoomRecord {
    pub id: String,
    pub name: String,
    pub room_type: RoomType,
    pub capacity: i64,
    pub features: String,
    pub location: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateRoom {
    pub name: String,
    pub room_type: RoomType,
    pub capacity: i64,
    pub features: String,
    pub location: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateRoom {
    pub name: Option<String>,
    pub room_type: Option<RoomType>,
    pub capacity: Option<i64>,
    pub features: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BookingRecord {
    pub id: String,
    pub room_id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub number_of_people: i64,
    pub purpose: String,
    pub status: BookingStatus,
    pub notes: String,
    pub decided_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingRecord {
    /// Booked duration in hours
    pub fn duration_hours(&self) -> f64 {
        (self.end_time - self.start_time).num_minutes() as f64 / 60.0
    }
}

#[derive(Debug, Clone)]
pub struct CreateBooking {
    pub room_id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub number_of_people: i64,
    pub purpose: String,
}

#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub user_id: Option<String>,
    pub room_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub status: Option<BookingStatus>,
}

// ============================================================================
// Repository
// ============================================================================

pub struct StudyRoomsRepository {
    pool: SqlitePool,
}

impl StudyRoomsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Rooms
    // ========================================================================

    pub async fn create_room(&self, room: CreateRoom) -> Result<StudyRoomRecord> {
        let id = new_id();
        let now = now_utc();

        sqlx::query(
            r#"
            INSERT INTO study_rooms (id, name, room_type, capacity, features, location, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&room.name)
        .bind(room.room_type)
        .bind(room.capacity)
        .bind(&room.features)
        .bind(&room.location)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_room(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create study room"))
    }

    pub async fn get_room(&self, id: &str) -> Result<Option<StudyRoomRecord>> {
        let room = sqlx::query_as::<_, StudyRoomRecord>("SELECT * FROM study_rooms WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(room)
    }

    pub async fn name_taken(&self, name: &str, exclude_id: Option<&str>) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM study_rooms WHERE name = ? COLLATE NOCASE AND id != ?",
        )
        .bind(name)
        .bind(exclude_id.unwrap_or(""))
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn list_rooms(&self, active_only: bool) -> Result<Vec<StudyRoomRecord>> {
        let sql = if active_only {
            "SELECT * FROM study_rooms WHERE is_active = 1 ORDER BY name"
        } else {
            "SELECT * FROM study_rooms ORDER BY name"
        };
        let rooms = sqlx::query_as::<_, StudyRoomRecord>(sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rooms)
    }

    pub async fn update_room(&self, id: &str, update: UpdateRoom) -> Result<Option<StudyRoomRecord>> {
        sqlx::query(
            r#"
            UPDATE study_rooms SET
                name = COALESCE(?, name),
                room_type = COALESCE(?, room_type),
                capacity = COALESCE(?, capacity),
                features = COALESCE(?, features),
                location = COALESCE(?, location),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.name)
        .bind(update.room_type)
        .bind(update.capacity)
        .bind(update.features)
        .bind(update.location)
        .bind(now_utc())
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_room(id).await
    }

    pub async fn set_room_active(&self, id: &str, is_active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE study_rooms SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(is_active)
            .bind(now_utc())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Bookings
    // ========================================================================

    /// Insert a pending booking unless it overlaps a pending or confirmed
    /// booking of the same room on the same date.
    ///
    /// The overlap check and the insert are one statement, so two concurrent
    /// requests for the same slot cannot both succeed. Returns `None` on
    /// conflict.
    pub async fn insert_booking_if_free(&self, booking: CreateBooking) -> Result<Option<BookingRecord>> {
        let id = new_id();
        let now = now_utc();

        let result = sqlx::query(
            r#"
            INSERT INTO study_room_bookings (id, room_id, user_id, date, start_time, end_time,
                number_of_people, purpose, status, created_at, updated_at)
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM study_room_bookings
                WHERE room_id = ?
                  AND date = ?
                  AND status IN ('pending', 'confirmed')
                  AND start_time < ?
                  AND end_time > ?
            )
            "#,
        )
        .bind(&id)
        .bind(&booking.room_id)
        .bind(&booking.user_id)
        .bind(booking.date)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(booking.number_of_people)
        .bind(&booking.purpose)
        .bind(now)
        .bind(now)
        .bind(&booking.room_id)
        .bind(booking.date)
        .bind(booking.end_time)
        .bind(booking.start_time)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_booking(&id).await
    }

    pub async fn get_booking(&self, id: &str) -> Result<Option<BookingRecord>> {
        let booking =
            sqlx::query_as::<_, BookingRecord>("SELECT * FROM study_room_bookings WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(booking)
    }

    pub async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<BookingRecord>> {
        let mut sql = String::from("SELECT * FROM study_room_bookings WHERE 1 = 1");
        if filter.user_id.is_some() {
            sql.push_str(" AND user_id = ?");
        }
        if filter.room_id.is_some() {
            sql.push_str(" AND room_id = ?");
        }
        if filter.date.is_some() {
            sql.push_str(" AND date = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY date DESC, start_time");

        let mut query = sqlx::query_as::<_, BookingRecord>(&sql);
        if let Some(ref user_id) = filter.user_id {
            query = query.bind(user_id);
        }
        if let Some(ref room_id) = filter.room_id {
            query = query.bind(room_id);
        }
        if let Some(date) = filter.date {
            query = query.bind(date);
        }
        if let Some(status) = filter.status {
            query = query.bind(status);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    /// Pending and confirmed bookings of a room on a date, by start time
    pub async fn holding_bookings(&self, room_id: &str, date: NaiveDate) -> Result<Vec<BookingRecord>> {
        let bookings = sqlx::query_as::<_, BookingRecord>(
            r#"
            SELECT * FROM study_room_bookings
            WHERE room_id = ? AND date = ? AND status IN ('pending', 'confirmed')
            ORDER BY start_time
            "#,
        )
        .bind(room_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    /// Move a booking to `to` only if it is currently in one of `from`.
    /// Returns false when the booking was not in an allowed state.
    pub async fn transition_booking(
        &self,
        id: &str,
        from: &[BookingStatus],
        to: BookingStatus,
        decided_by: Option<&str>,
        notes: Option<&str>,
    ) -> Result<bool> {
        let allowed = from
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            UPDATE study_room_bookings SET
                status = ?,
                decided_by = COALESCE(?, decided_by),
                notes = COALESCE(?, notes),
                updated_at = ?
            WHERE id = ? AND status IN ({})
            "#,
            allowed
        );

        let result = sqlx::query(&sql)
            .bind(to)
            .bind(decided_by)
            .bind(notes)
            .bind(now_utc())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
