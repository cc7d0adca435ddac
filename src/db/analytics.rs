//! Analytics repository: raw events, popularity counters, daily rollups and
//! system health snapshots

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::SqlitePool;
use sqlx::types::Json;

use super::sqlite_helpers::{new_id, now_utc};

// ============================================================================
// Enums
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, async_graphql::Enum,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    BookView,
    Search,
    Login,
    Logout,
    Checkout,
    Return,
    Reservation,
    Download,
    Registration,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, async_graphql::Enum,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ItemType {
    Book,
    Document,
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AnalyticsEventRecord {
    pub id: String,
    pub event_type: EventType,
    pub user_id: Option<String>,
    pub session_id: String,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub page_url: String,
    pub search_query: String,
    pub book_id: Option<String>,
    pub document_id: Option<String>,
    pub referrer: String,
    pub metadata: Json<JsonValue>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateAnalyticsEvent {
    pub event_type: EventType,
    pub user_id: Option<String>,
    pub session_id: String,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub page_url: String,
    pub search_query: String,
    pub book_id: Option<String>,
    pub document_id: Option<String>,
    pub referrer: String,
    pub metadata: JsonValue,
}

impl CreateAnalyticsEvent {
    /// Event with only a type and optional user; everything else blank
    pub fn new(event_type: EventType, user_id: Option<&str>) -> Self {
        Self {
            event_type,
            user_id: user_id.map(str::to_string),
            session_id: String::new(),
            ip_address: None,
            user_agent: String::new(),
            page_url: String::new(),
            search_query: String::new(),
            book_id: None,
            document_id: None,
            referrer: String::new(),
            metadata: JsonValue::Object(Default::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PopularItemRecord {
    pub id: String,
    pub item_type: ItemType,
    pub item_id: String,
    pub view_count: i64,
    pub checkout_count: i64,
    pub search_count: i64,
    pub total_score: i64,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailyStatsRecord {
    pub date: NaiveDate,
    pub total_users: i64,
    pub active_users: i64,
    pub new_users: i64,
    pub total_books: i64,
    pub available_books: i64,
    pub checked_out_books: i64,
    pub total_loans: i64,
    pub active_loans: i64,
    pub overdue_loans: i64,
    pub returned_today: i64,
    pub total_documents: i64,
    pub document_downloads: i64,
    pub page_views: i64,
    pub searches: i64,
    pub logins: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SystemHealthRecord {
    pub id: String,
    pub response_time: f64,
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
    pub disk_usage: Option<f64>,
    pub error_count: i64,
    pub last_error: String,
    pub db_connections: i64,
    pub db_query_count: i64,
    pub checked_at: DateTime<Utc>,
}

const DAILY_STATS_COLUMNS: &str = "date, total_users, active_users, new_users, total_books, \
    available_books, checked_out_books, total_loans, active_loans, overdue_loans, returned_today, \
    total_documents, document_downloads, page_views, searches, logins";

// ============================================================================
// Repository
// ============================================================================

pub struct AnalyticsRepository {
    pool: SqlitePool,
}

impl AnalyticsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub async fn record_event(&self, event: CreateAnalyticsEvent) -> Result<AnalyticsEventRecord> {
        let id = new_id();
        sqlx::query(
            r#"
            INSERT INTO analytics_events (id, event_type, user_id, session_id, ip_address, user_agent,
                page_url, search_query, book_id, document_id, referrer, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(event.event_type)
        .bind(&event.user_id)
        .bind(&event.session_id)
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(&event.page_url)
        .bind(&event.search_query)
        .bind(&event.book_id)
        .bind(&event.document_id)
        .bind(&event.referrer)
        .bind(Json(&event.metadata))
        .bind(now_utc())
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, AnalyticsEventRecord>("SELECT * FROM analytics_events WHERE id = ?")
            .bind(&id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to record analytics event"))
    }

    pub async fn recent_events(&self, limit: i64) -> Result<Vec<AnalyticsEventRecord>> {
        Ok(sqlx::query_as::<_, AnalyticsEventRecord>(
            "SELECT * FROM analytics_events ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Count events of a type within `[from, to)`
    pub async fn count_events(
        &self,
        event_type: EventType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM analytics_events WHERE event_type = ? AND created_at >= ? AND created_at < ?",
        )
        .bind(event_type)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?)
    }

    // ========================================================================
    // Popularity
    // ========================================================================

    /// Add to an item's counters, creating the row on first touch, and
    /// recompute its score as `views + 5 * checkouts + 2 * searches`
    pub async fn bump_popularity(
        &self,
        item_type: ItemType,
        item_id: &str,
        views: i64,
        checkouts: i64,
        searches: i64,
    ) -> Result<PopularItemRecord> {
        let now = now_utc();
        sqlx::query(
            r#"
            INSERT INTO popular_items (id, item_type, item_id, view_count, checkout_count, search_count, total_score, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, ? + 5 * ? + 2 * ?, ?)
            ON CONFLICT (item_type, item_id) DO UPDATE SET
                view_count = view_count + excluded.view_count,
                checkout_count = checkout_count + excluded.checkout_count,
                search_count = search_count + excluded.search_count,
                total_score = (view_count + excluded.view_count)
                    + 5 * (checkout_count + excluded.checkout_count)
                    + 2 * (search_count + excluded.search_count),
                last_updated = excluded.last_updated
            "#,
        )
        .bind(new_id())
        .bind(item_type)
        .bind(item_id)
        .bind(views)
        .bind(checkouts)
        .bind(searches)
        .bind(views)
        .bind(checkouts)
        .bind(searches)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_popularity(item_type, item_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to update popularity"))
    }

    pub async fn get_popularity(&self, item_type: ItemType, item_id: &str) -> Result<Option<PopularItemRecord>> {
        Ok(sqlx::query_as::<_, PopularItemRecord>(
            "SELECT * FROM popular_items WHERE item_type = ? AND item_id = ?",
        )
        .bind(item_type)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn top_items(&self, item_type: ItemType, limit: i64) -> Result<Vec<PopularItemRecord>> {
        Ok(sqlx::query_as::<_, PopularItemRecord>(
            "SELECT * FROM popular_items WHERE item_type = ? ORDER BY total_score DESC, last_updated DESC LIMIT ?",
        )
        .bind(item_type)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    // ========================================================================
    // Daily Stats
    // ========================================================================

    /// Compute the rollup for `date` from the live tables
    pub async fn compute_daily_stats(&self, date: NaiveDate, now: DateTime<Utc>) -> Result<DailyStatsRecord> {
        let day = date.format("%Y-%m-%d").to_string();
        let active_since = now - Duration::days(30);

        let total_users = self.count("SELECT COUNT(*) FROM users", None).await?;
        let active_users = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE last_login_at >= ?",
        )
        .bind(active_since)
        .fetch_one(&self.pool)
        .await?;
        let new_users = self
            .count("SELECT COUNT(*) FROM users WHERE date(date_joined) = ?", Some(&day))
            .await?;
        let total_books = self.count("SELECT COUNT(*) FROM books", None).await?;
        let available_books = self
            .count("SELECT COUNT(*) FROM book_copies WHERE status = 'available'", None)
            .await?;
        let checked_out_books = self
            .count("SELECT COUNT(*) FROM book_copies WHERE status = 'checked_out'", None)
            .await?;
        let total_loans = self.count("SELECT COUNT(*) FROM loans", None).await?;
        let active_loans = self
            .count("SELECT COUNT(*) FROM loans WHERE status = 'active'", None)
            .await?;
        let overdue_loans = self
            .count("SELECT COUNT(*) FROM loans WHERE status = 'overdue'", None)
            .await?;
        let returned_today = self
            .count("SELECT COUNT(*) FROM loans WHERE date(return_date) = ?", Some(&day))
            .await?;
        let total_documents = self.count("SELECT COUNT(*) FROM ebooks", None).await?;

        Ok(DailyStatsRecord {
            date,
            total_users,
            active_users,
            new_users,
            total_books,
            available_books,
            checked_out_books,
            total_loans,
            active_loans,
            overdue_loans,
            returned_today,
            total_documents,
            document_downloads: self.count_events_on(EventType::Download, &day).await?,
            page_views: self.count_events_on(EventType::PageView, &day).await?,
            searches: self.count_events_on(EventType::Search, &day).await?,
            logins: self.count_events_on(EventType::Login, &day).await?,
        })
    }

    async fn count(&self, sql: &str, day: Option<&str>) -> Result<i64> {
        let mut query = sqlx::query_scalar::<_, i64>(sql);
        if let Some(day) = day {
            query = query.bind(day);
        }
        Ok(query.fetch_one(&self.pool).await?)
    }

    async fn count_events_on(&self, event_type: EventType, day: &str) -> Result<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM analytics_events WHERE event_type = ? AND date(created_at) = ?",
        )
        .bind(event_type)
        .bind(day)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Insert or replace the rollup for its date
    pub async fn upsert_daily_stats(&self, stats: &DailyStatsRecord) -> Result<()> {
        let now = now_utc();
        sqlx::query(&format!(
            r#"
            INSERT INTO daily_stats ({}, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (date) DO UPDATE SET
                total_users = excluded.total_users,
                active_users = excluded.active_users,
                new_users = excluded.new_users,
                total_books = excluded.total_books,
                available_books = excluded.available_books,
                checked_out_books = excluded.checked_out_books,
                total_loans = excluded.total_loans,
                active_loans = excluded.active_loans,
                overdue_loans = excluded.overdue_loans,
                returned_today = excluded.returned_today,
                total_documents = excluded.total_documents,
                document_downloads = excluded.document_downloads,
                page_views = excluded.page_views,
                searches = excluded.searches,
                logins = excluded.logins,
                updated_at = excluded.updated_at
            "#,
            DAILY_STATS_COLUMNS
        ))
        .bind(stats.date)
        .bind(stats.total_users)
        .bind(stats.active_users)
        .bind(stats.new_users)
        .bind(stats.total_books)
        .bind(stats.available_books)
        .bind(stats.checked_out_books)
        .bind(stats.total_loans)
        .bind(stats.active_loans)
        .bind(stats.overdue_loans)
        .bind(stats.returned_today)
        .bind(stats.total_documents)
        .bind(stats.document_downloads)
        .bind(stats.page_views)
        .bind(stats.searches)
        .bind(stats.logins)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rollups with `from <= date <= to`, oldest first
    pub async fn daily_stats_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DailyStatsRecord>> {
        Ok(sqlx::query_as::<_, DailyStatsRecord>(&format!(
            "SELECT {} FROM daily_stats WHERE date >= ? AND date <= ? ORDER BY date",
            DAILY_STATS_COLUMNS
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?)
    }

    // ========================================================================
    // System Health
    // ========================================================================

    pub async fn record_health(&self, health: &SystemHealthRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO system_health (id, response_time, cpu_usage, memory_usage, disk_usage,
                error_count, last_error, db_connections, db_query_count, checked_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&health.id)
        .bind(health.response_time)
        .bind(health.cpu_usage)
        .bind(health.memory_usage)
        .bind(health.disk_usage)
        .bind(health.error_count)
        .bind(&health.last_error)
        .bind(health.db_connections)
        .bind(health.db_query_count)
        .bind(health.checked_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn latest_health(&self) -> Result<Option<SystemHealthRecord>> {
        Ok(sqlx::query_as::<_, SystemHealthRecord>(
            "SELECT * FROM system_health ORDER BY checked_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Drop health samples older than `before`
    pub async fn prune_health(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM system_health WHERE checked_at < ?")
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
