use super::prelude::*;

#[derive(Default)]
pub struct CirculationMutations;

#[Object]
impl CirculationMutations {
    // ------------------------------------------------------------------------
    // Loans
    // ------------------------------------------------------------------------

    /// Lend a copy. Patrons borrow for themselves; staff may name a borrower.
    async fn checkout_book(
        &self,
        ctx: &Context<'_>,
        copy_id: String,
        user_id: Option<String>,
    ) -> Result<LoanResult> {
        let actor = ctx.actor()?;
        let borrower = user_id.unwrap_or_else(|| actor.user_id.clone());
        let result = svc(ctx).circulation.checkout(actor, &borrower, &copy_id).await;
        finish(result, |loan| LoanResult::success(loan.into()))
    }

    async fn return_loan(&self, ctx: &Context<'_>, id: String) -> Result<ReturnResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).circulation.return_loan(actor, &id).await;
        finish(result, |outcome| ReturnResult::success(outcome.into()))
    }

    async fn renew_loan(&self, ctx: &Context<'_>, id: String) -> Result<LoanResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).circulation.renew(actor, &id).await;
        finish(result, |loan| LoanResult::success(loan.into()))
    }

    async fn mark_loan_lost(&self, ctx: &Context<'_>, id: String) -> Result<LoanResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).circulation.mark_lost(actor, &id).await;
        finish(result, |loan| LoanResult::success(loan.into()))
    }

    // ------------------------------------------------------------------------
    // Reservations
    // ------------------------------------------------------------------------

    /// Hold a book that has no copy on the shelf
    async fn reserve_book(&self, ctx: &Context<'_>, book_id: String) -> Result<ReservationResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).circulation.reserve(actor, &book_id).await;
        finish(result, |r| ReservationResult::success(r.into()))
    }

    async fn cancel_reservation(&self, ctx: &Context<'_>, id: String) -> Result<ReservationResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).circulation.cancel_reservation(actor, &id).await;
        finish(result, |r| ReservationResult::success(r.into()))
    }

    async fn fulfill_reservation(&self, ctx: &Context<'_>, id: String) -> Result<ReservationResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).circulation.fulfill_reservation(actor, &id).await;
        finish(result, |r| ReservationResult::success(r.into()))
    }

    // ------------------------------------------------------------------------
    // Fines
    // ------------------------------------------------------------------------

    async fn pay_fine(&self, ctx: &Context<'_>, id: String) -> Result<FineResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).circulation.pay_fine(actor, &id).await;
        finish(result, |fine| FineResult::success(fine.into()))
    }

    async fn waive_fine(&self, ctx: &Context<'_>, id: String) -> Result<FineResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).circulation.waive_fine(actor, &id).await;
        finish(result, |fine| FineResult::success(fine.into()))
    }

    // ------------------------------------------------------------------------
    // Loan requests
    // ------------------------------------------------------------------------

    /// Ask staff to set aside a copy of the book
    async fn request_loan(
        &self,
        ctx: &Context<'_>,
        book_id: String,
        #[graphql(default)] notes: String,
    ) -> Result<LoanRequestResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).circulation.request_loan(actor, &book_id, &notes).await;
        finish(result, |r| LoanRequestResult::success(r.into()))
    }

    async fn approve_loan_request(&self, ctx: &Context<'_>, id: String) -> Result<LoanRequestResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).circulation.approve_request(actor, &id).await;
        finish(result, |r| LoanRequestResult::success(r.into()))
    }

    async fn reject_loan_request(
        &self,
        ctx: &Context<'_>,
        id: String,
        #[graphql(default)] reason: String,
    ) -> Result<LoanRequestResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).circulation.reject_request(actor, &id, &reason).await;
        finish(result, |r| LoanRequestResult::success(r.into()))
    }

    async fn cancel_loan_request(&self, ctx: &Context<'_>, id: String) -> Result<LoanRequestResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).circulation.cancel_request(actor, &id).await;
        finish(result, |r| LoanRequestResult::success(r.into()))
    }

    // ------------------------------------------------------------------------
    // Attendance
    // ------------------------------------------------------------------------

    /// Log a visitor in at the front desk; signed-in callers are linked to the visit
    async fn check_in(&self, ctx: &Context<'_>, input: CheckInInput) -> Result<AttendanceResult> {
        let result = svc(ctx)
            .circulation
            .check_in(ctx.try_actor(), input.into())
            .await;
        finish(result, |a| AttendanceResult::success(a.into()))
    }

    async fn check_out(&self, ctx: &Context<'_>, id: String) -> Result<AttendanceResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).circulation.check_out(actor, &id).await;
        finish(result, |a| AttendanceResult::success(a.into()))
    }

    /// Close several open visits at once
    async fn bulk_check_out(&self, ctx: &Context<'_>, ids: Vec<String>) -> Result<CountResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).circulation.bulk_check_out(actor, &ids).await;
        finish(result, |n| CountResult::success(n as i64))
    }
}
