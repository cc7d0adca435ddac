//! Usage analytics: event tracking, popularity, daily rollups and health samples

use std::time::Instant;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::db::sqlite_helpers::{new_id, now_utc, to_storage};
use crate::db::{
    AnalyticsEventRecord, CreateAnalyticsEvent, DailyStatsRecord, Database, ItemType,
    PopularItemRecord, SystemHealthRecord,
};

use super::metrics::SharedMetrics;
use super::{Actor, ServiceError, ServiceResult};

/// Health samples older than this are pruned when a new one is taken
const HEALTH_RETENTION_DAYS: i64 = 7;

/// Everything the staff analytics page shows
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsDashboard {
    pub days: i64,
    /// Live rollup for today, not yet persisted
    pub today: DailyStatsRecord,
    pub daily_stats: Vec<DailyStatsRecord>,
    pub popular_books: Vec<PopularItemRecord>,
    pub popular_documents: Vec<PopularItemRecord>,
    pub recent_events: Vec<AnalyticsEventRecord>,
    pub latest_health: Option<SystemHealthRecord>,
}

#[derive(Clone)]
pub struct AnalyticsService {
    db: Database,
    metrics: SharedMetrics,
}

impl AnalyticsService {
    pub fn new(db: Database, metrics: SharedMetrics) -> Self {
        Self { db, metrics }
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Store an event submitted by a client. The user is always the caller.
    pub async fn track_event(
        &self,
        actor: Option<&Actor>,
        mut event: CreateAnalyticsEvent,
    ) -> ServiceResult<AnalyticsEventRecord> {
        event.user_id = actor.map(|a| a.user_id.clone());
        if !event.metadata.is_object() {
            return Err(ServiceError::validation("metadata must be a JSON object"));
        }
        Ok(self.db.analytics().record_event(event).await?)
    }

    /// Best-effort recording used by other services; failures are logged
    pub async fn record(&self, event: CreateAnalyticsEvent) {
        let event_type = event.event_type;
        if let Err(e) = self.db.analytics().record_event(event).await {
            warn!(event_type = ?event_type, error = %e, "Failed to record analytics event");
        }
    }

    /// Best-effort popularity update; failures are logged
    pub async fn bump(
        &self,
        item_type: ItemType,
        item_id: &str,
        views: i64,
        checkouts: i64,
        searches: i64,
    ) {
        if let Err(e) = self
            .db
            .analytics()
            .bump_popularity(item_type, item_id, views, checkouts, searches)
            .await
        {
            warn!(item_id = %item_id, error = %e, "Failed to update popularity");
        }
    }

    pub async fn popular_items(
        &self,
        item_type: ItemType,
        limit: i64,
    ) -> ServiceResult<Vec<PopularItemRecord>> {
        Ok(self
            .db
            .analytics()
            .top_items(item_type, limit.clamp(1, 100))
            .await?)
    }

    // ========================================================================
    // Rollups
    // ========================================================================

    /// Compute and persist the statistics row for `date`
    pub async fn snapshot_daily_stats(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> ServiceResult<DailyStatsRecord> {
        let now = to_storage(now);
        let analytics = self.db.analytics();
        let stats = analytics.compute_daily_stats(date, now).await?;
        analytics.upsert_daily_stats(&stats).await?;
        info!(date = %date, page_views = stats.page_views, "Daily stats recorded");
        Ok(stats)
    }

    /// Ping the database, sample the host and store a health row
    pub async fn record_health(&self, now: DateTime<Utc>) -> ServiceResult<SystemHealthRecord> {
        let now = to_storage(now);
        let started = Instant::now();
        let ping = self.db.ping().await;
        let response_time = started.elapsed().as_secs_f64();

        let usage = self.metrics.sample_resources();
        let mut counters = self.metrics.take_counters();
        if let Err(e) = ping {
            counters.errors += 1;
            counters.last_error = format!("Database ping failed: {}", e);
        }

        let health = SystemHealthRecord {
            id: new_id(),
            response_time,
            cpu_usage: Some(usage.cpu_percent),
            memory_usage: Some(usage.memory_percent),
            disk_usage: usage.disk_percent,
            error_count: counters.errors as i64,
            last_error: counters.last_error,
            db_connections: self.db.pool().size() as i64,
            db_query_count: counters.requests as i64,
            checked_at: now,
        };

        let analytics = self.db.analytics();
        analytics.record_health(&health).await?;
        let pruned = analytics
            .prune_health(now - Duration::days(HEALTH_RETENTION_DAYS))
            .await?;
        if pruned > 0 {
            info!(pruned, "Pruned old health samples");
        }
        Ok(health)
    }

    pub async fn dashboard(&self, actor: &Actor, days: i64) -> ServiceResult<AnalyticsDashboard> {
        actor.require_staff()?;
        self.dashboard_at(days, now_utc()).await
    }

    pub async fn dashboard_at(
        &self,
        days: i64,
        now: DateTime<Utc>,
    ) -> ServiceResult<AnalyticsDashboard> {
        let now = to_storage(now);
        let days = days.clamp(1, 365);
        let analytics = self.db.analytics();
        let today = now.date_naive();

        Ok(AnalyticsDashboard {
            days,
            today: analytics.compute_daily_stats(today, now).await?,
            daily_stats: analytics
                .daily_stats_between(today - Duration::days(days), today)
                .await?,
            popular_books: analytics.top_items(ItemType::Book, 10).await?,
            popular_documents: analytics.top_items(ItemType::Document, 10).await?,
            recent_events: analytics.recent_events(50).await?,
            latest_health: analytics.latest_health().await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{EventType, MembershipType};
    use crate::services::test_support::{member_actor, staff_actor, test_db, test_services};
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_track_event_uses_caller_identity() {
        let db = test_db().await;
        let services = test_services(&db);
        let actor = member_actor(&db, "lin", MembershipType::Student).await;

        let mut event = CreateAnalyticsEvent::new(EventType::PageView, Some("someone-else"));
        event.page_url = "/catalog".into();
        let stored = services.analytics.track_event(Some(&actor), event).await.unwrap();

        assert_eq!(stored.user_id.as_deref(), Some(actor.user_id.as_str()));
        assert_eq!(stored.page_url, "/catalog");
    }

    #[tokio::test]
    async fn test_popularity_score_accumulates() {
        let db = test_db().await;
        let services = test_services(&db);

        services.analytics.bump(ItemType::Book, "b1", 3, 0, 0).await;
        let first = db.analytics().get_popularity(ItemType::Book, "b1").await.unwrap().unwrap();
        assert_eq!(first.total_score, 3);
        services.analytics.bump(ItemType::Book, "b1", 0, 1, 2).await;

        let item = db.analytics().get_popularity(ItemType::Book, "b1").await.unwrap().unwrap();
        assert_eq!(item.view_count, 3);
        assert_eq!(item.checkout_count, 1);
        assert_eq!(item.search_count, 2);
        assert_eq!(item.total_score, 3 + 5 + 4);
    }

    #[tokio::test]
    async fn test_daily_snapshot_is_upserted() {
        let db = test_db().await;
        let services = test_services(&db);
        let now = Utc::now();

        services
            .analytics
            .record(CreateAnalyticsEvent::new(EventType::Login, None))
            .await;
        let first = services
            .analytics
            .snapshot_daily_stats(now.date_naive(), now)
            .await
            .unwrap();
        assert_eq!(first.logins, 1);

        services
            .analytics
            .record(CreateAnalyticsEvent::new(EventType::Login, None))
            .await;
        services
            .analytics
            .snapshot_daily_stats(now.date_naive(), now)
            .await
            .unwrap();

        let rows = db
            .analytics()
            .daily_stats_between(now.date_naive(), now.date_naive())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].logins, 2);
    }

    #[tokio::test]
    async fn test_health_sample_drains_counters() {
        let db = test_db().await;
        let services = test_services(&db);
        services.metrics.record_request();
        services.metrics.record_error("boom");

        let health = services.analytics.record_health(Utc::now()).await.unwrap();
        assert_eq!(health.db_query_count, 1);
        assert_eq!(health.error_count, 1);
        assert_eq!(health.last_error, "boom");

        let latest = db.analytics().latest_health().await.unwrap().unwrap();
        assert_eq!(latest.id, health.id);
    }

    #[tokio::test]
    async fn test_dashboard_is_staff_only() {
        let db = test_db().await;
        let services = test_services(&db);
        let patron = member_actor(&db, "pat", MembershipType::Public).await;
        let staff = staff_actor(&db, "sam").await;

        assert_matches!(
            services.analytics.dashboard(&patron, 7).await,
            Err(ServiceError::Forbidden(_))
        );
        let dashboard = services.analytics.dashboard(&staff, 7).await.unwrap();
        assert_eq!(dashboard.days, 7);
        assert_eq!(dashboard.today.total_users, 2);
    }
}
