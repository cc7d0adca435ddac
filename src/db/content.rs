//! Blog posts, library events and event registrations

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::sqlite_helpers::{new_id, now_utc};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, async_graphql::Enum,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Published,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlogPostRecord {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author_id: String,
    pub status: PostStatus,
    pub published_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub location: String,
    pub organizer_id: String,
    pub max_attendees: Option<i64>,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateEvent {
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub location: String,
    pub organizer_id: String,
    pub max_attendees: Option<i64>,
    pub registration_deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventRegistrationRecord {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a registration attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered(String),
    AlreadyRegistered,
    Full,
}

pub struct ContentRepository {
    pool: SqlitePool,
}

impl ContentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Blog
    // ========================================================================

    pub async fn create_post(&self, title: &str, content: &str, author_id: &str) -> Result<BlogPostRecord> {
        let id = new_id();
        let now = now_utc();
        sqlx::query(
            r#"
            INSERT INTO blog_posts (id, title, content, author_id, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'draft', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(title)
        .bind(content)
        .bind(author_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.get_post(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create blog post"))
    }

    pub async fn get_post(&self, id: &str) -> Result<Option<BlogPostRecord>> {
        Ok(sqlx::query_as::<_, BlogPostRecord>("SELECT * FROM blog_posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn update_post(&self, id: &str, title: Option<&str>, content: Option<&str>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE blog_posts SET title = COALESCE(?, title), content = COALESCE(?, content), updated_at = ? WHERE id = ?",
        )
        .bind(title)
        .bind(content)
        .bind(now_utc())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Publish a post; the first publication date is kept on re-publish
    pub async fn publish_post(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE blog_posts SET status = 'published', published_date = COALESCE(published_date, ?), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(at)
        .bind(now_utc())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn unpublish_post(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE blog_posts SET status = 'draft', updated_at = ? WHERE id = ?")
            .bind(now_utc())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_posts(&self, published_only: bool) -> Result<Vec<BlogPostRecord>> {
        let sql = if published_only {
            "SELECT * FROM blog_posts WHERE status = 'published' ORDER BY published_date DESC"
        } else {
            "SELECT * FROM blog_posts ORDER BY created_at DESC"
        };
        Ok(sqlx::query_as::<_, BlogPostRecord>(sql)
            .fetch_all(&self.pool)
            .await?)
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub async fn create_event(&self, event: CreateEvent) -> Result<EventRecord> {
        let id = new_id();
        let now = now_utc();
        sqlx::query(
            r#"
            INSERT INTO events (id, title, description, date, time, location, organizer_id,
                max_attendees, registration_deadline, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.date)
        .bind(event.time)
        .bind(&event.location)
        .bind(&event.organizer_id)
        .bind(event.max_attendees)
        .bind(event.registration_deadline)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.get_event(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to create event"))
    }

    pub async fn get_event(&self, id: &str) -> Result<Option<EventRecord>> {
        Ok(sqlx::query_as::<_, EventRecord>("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Events on or after `from`, soonest first
    pub async fn list_upcoming(&self, from: NaiveDate) -> Result<Vec<EventRecord>> {
        Ok(sqlx::query_as::<_, EventRecord>(
            "SELECT * FROM events WHERE date >= ? ORDER BY date, time",
        )
        .bind(from)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn registration_count(&self, event_id: &str) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM event_registrations WHERE event_id = ?")
            .bind(event_id)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn is_registered(&self, event_id: &str, user_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM event_registrations WHERE event_id = ? AND user_id = ?",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Register a user, checking duplicates and capacity inside one transaction
    pub async fn register(
        &self,
        event_id: &str,
        user_id: &str,
        max_attendees: Option<i64>,
    ) -> Result<RegisterOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM event_registrations WHERE event_id = ? AND user_id = ?",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        if existing > 0 {
            return Ok(RegisterOutcome::AlreadyRegistered);
        }

        if let Some(max) = max_attendees {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM event_registrations WHERE event_id = ?")
                    .bind(event_id)
                    .fetch_one(&mut *tx)
                    .await?;
            if count >= max {
                return Ok(RegisterOutcome::Full);
            }
        }

        let id = new_id();
        sqlx::query(
            "INSERT INTO event_registrations (id, event_id, user_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(event_id)
        .bind(user_id)
        .bind(now_utc())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(RegisterOutcome::Registered(id))
    }

    pub async fn unregister(&self, event_id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM event_registrations WHERE event_id = ? AND user_id = ?")
            .bind(event_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn registrations_for_user(&self, user_id: &str) -> Result<Vec<EventRegistrationRecord>> {
        Ok(sqlx::query_as::<_, EventRegistrationRecord>(
            "SELECT * FROM event_registrations WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }
}
