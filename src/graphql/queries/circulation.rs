use super::prelude::*;
use crate::db::{FineStatus, LoanRequestStatus, ReservationStatus};

#[derive(Default)]
pub struct CirculationQueries;

/// Listings default to the caller's own rows; staff may name any user
#[Object]
impl CirculationQueries {
    async fn loans(&self, ctx: &Context<'_>, filter: Option<LoanFilterInput>) -> Result<Vec<Loan>> {
        let actor = ctx.actor()?;
        let loans = svc(ctx)
            .circulation
            .list_loans(actor, filter.unwrap_or_default().into())
            .await?;
        Ok(loans.into_iter().map(Into::into).collect())
    }

    async fn loan(&self, ctx: &Context<'_>, id: String) -> Result<Loan> {
        let actor = ctx.actor()?;
        Ok(svc(ctx).circulation.get_loan(actor, &id).await?.into())
    }

    async fn reservations(
        &self,
        ctx: &Context<'_>,
        user_id: Option<String>,
        status: Option<ReservationStatus>,
    ) -> Result<Vec<Reservation>> {
        let actor = ctx.actor()?;
        let rows = svc(ctx)
            .circulation
            .list_reservations(actor, user_id, status)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn fines(
        &self,
        ctx: &Context<'_>,
        user_id: Option<String>,
        status: Option<FineStatus>,
    ) -> Result<Vec<Fine>> {
        let actor = ctx.actor()?;
        let rows = svc(ctx).circulation.list_fines(actor, user_id, status).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn loan_requests(
        &self,
        ctx: &Context<'_>,
        user_id: Option<String>,
        status: Option<LoanRequestStatus>,
    ) -> Result<Vec<LoanRequest>> {
        let actor = ctx.actor()?;
        let rows = svc(ctx).circulation.list_requests(actor, user_id, status).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn loan_request(&self, ctx: &Context<'_>, id: String) -> Result<LoanRequest> {
        let actor = ctx.actor()?;
        Ok(svc(ctx).circulation.get_request(actor, &id).await?.into())
    }

    async fn attendance(
        &self,
        ctx: &Context<'_>,
        filter: Option<AttendanceFilterInput>,
    ) -> Result<Vec<Attendance>> {
        let actor = ctx.actor()?;
        let rows = svc(ctx)
            .circulation
            .list_attendance(actor, filter.unwrap_or_default().into())
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Loans, holds, requests and fines of the signed-in patron
    async fn my_dashboard(&self, ctx: &Context<'_>) -> Result<PatronDashboard> {
        let actor = ctx.actor()?;
        Ok(svc(ctx).circulation.patron_dashboard(actor).await?.into())
    }

    #[graphql(guard = "StaffGuard")]
    async fn staff_dashboard(&self, ctx: &Context<'_>) -> Result<StaffDashboard> {
        let actor = ctx.actor()?;
        Ok(svc(ctx).circulation.staff_dashboard(actor).await?.into())
    }
}
