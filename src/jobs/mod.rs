//! Background job scheduling
//!
//! Housekeeping that must happen even when nobody calls the API: request and
//! hold expiry, overdue marking, daily statistics and health sampling.

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::db::sqlite_helpers::now_utc;
use crate::services::Services;

/// Expire stale loan requests and sample system health
pub async fn run_frequent(services: &Services) {
    let now = now_utc();
    if let Err(e) = services.circulation.expire_requests(now).await {
        warn!(error = %e, "Loan request expiry failed");
    }
    if let Err(e) = services.analytics.record_health(now).await {
        warn!(error = %e, "Health sample failed");
    }
}

/// Flag overdue loans, lapse old reservations and drop dead revocations
pub async fn run_circulation_sweep(services: &Services) {
    let now = now_utc();
    if let Err(e) = services.circulation.mark_overdue_loans(now).await {
        error!(error = %e, "Overdue sweep failed");
    }
    if let Err(e) = services.circulation.expire_reservations(now).await {
        error!(error = %e, "Reservation expiry failed");
    }
    if let Err(e) = services.auth.cleanup_revoked(now).await {
        warn!(error = %e, "Revoked token cleanup failed");
    }
}

/// Snapshot the day's counters
pub async fn run_daily_snapshot(services: &Services) {
    let now = now_utc();
    let today = now.date_naive();
    match services.analytics.snapshot_daily_stats(today, now).await {
        Ok(stats) => info!(date = %stats.date, page_views = stats.page_views, "Daily stats stored"),
        Err(e) => error!(error = %e, "Daily stats snapshot failed"),
    }
}

/// Initialize and start the job scheduler
pub async fn start_scheduler(services: Services) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    // Loan requests and health - every 5 minutes
    let svc = services.clone();
    let frequent_job = Job::new_async("0 */5 * * * *", move |_uuid, _l| {
        let svc = svc.clone();
        Box::pin(async move { run_frequent(&svc).await })
    })?;
    scheduler.add(frequent_job).await?;

    // Overdue loans and reservations - every 15 minutes
    let svc = services.clone();
    let sweep_job = Job::new_async("0 */15 * * * *", move |_uuid, _l| {
        let svc = svc.clone();
        Box::pin(async move { run_circulation_sweep(&svc).await })
    })?;
    scheduler.add(sweep_job).await?;

    // Daily statistics - 23:55 UTC
    let svc = services;
    let snapshot_job = Job::new_async("0 55 23 * * *", move |_uuid, _l| {
        let svc = svc.clone();
        Box::pin(async move { run_daily_snapshot(&svc).await })
    })?;
    scheduler.add(snapshot_job).await?;

    scheduler.start().await?;

    info!("Job scheduler started");
    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{LoanFilter, LoanStatus, MembershipType};
    use crate::services::catalog::tests::seed_book;
    use crate::services::test_support::{member_actor, staff_actor, test_db, test_services};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_jobs_run_against_empty_database() {
        let db = test_db().await;
        let services = test_services(&db);
        run_frequent(&services).await;
        run_circulation_sweep(&services).await;
        run_daily_snapshot(&services).await;
    }

    #[tokio::test]
    async fn test_sweep_marks_past_due_loans() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Public).await;
        let (_, copies) = seed_book(&services, &staff, "Dune", "9780306406157", 1).await;

        services
            .circulation
            .checkout_at(&staff, &patron.user_id, &copies[0].id, Utc::now() - Duration::days(30))
            .await
            .unwrap();
        run_circulation_sweep(&services).await;

        let overdue = services
            .circulation
            .list_loans(
                &staff,
                LoanFilter {
                    status: Some(LoanStatus::Overdue),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(overdue.len(), 1);
    }
}
