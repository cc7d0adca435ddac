//! Circulation: loans, reservations, fines, loan requests and attendance
//!
//! Every state change goes through a conditional update in the repository,
//! so a loan or request that changed underneath us surfaces as
//! `InvalidState` rather than being overwritten.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::CirculationPolicy;
use crate::db::sqlite_helpers::{decimal_to_str, now_utc, str_to_decimal, to_storage};
use crate::db::{
    ApproveOutcome, AttendanceFilter, AttendanceRecord, AttendanceStatus, CreateAnalyticsEvent,
    CreateAttendance, Database, EventType, FineRecord, FineStatus, ItemType, LoanFilter, LoanRecord,
    LoanRequestRecord, LoanRequestStatus, LoanStatus, NewFine, NotificationCategory,
    ReservationRecord, ReservationStatus, UserRecord,
};

use super::analytics::AnalyticsService;
use super::notifications::Notifier;
use super::rules;
use super::{Actor, ServiceError, ServiceResult};

/// Loans due within this many days show up as "due soon"
const DUE_SOON_DAYS: i64 = 3;

/// A closed loan and the fine it produced, if late
#[derive(Debug, Clone, Serialize)]
pub struct ReturnOutcome {
    pub loan: LoanRecord,
    pub fine: Option<FineRecord>,
}

/// Visitor details captured at the door
#[derive(Debug, Clone, Default)]
pub struct CheckInInput {
    pub registration_number: String,
    pub full_name: String,
    pub department: String,
    pub faculty: String,
    pub phone: String,
    pub purpose: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatronDashboard {
    pub open_loans: Vec<LoanRecord>,
    pub due_soon: Vec<LoanRecord>,
    pub active_reservations: Vec<ReservationRecord>,
    pub pending_requests: Vec<LoanRequestRecord>,
    pub unpaid_fines: Vec<FineRecord>,
    pub total_unpaid: String,
    pub can_borrow: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StaffDashboard {
    pub active_loans: i64,
    pub overdue_loans: i64,
    pub pending_requests: i64,
    pub active_visitors: i64,
    pub outstanding_fines: String,
    pub request_queue: Vec<LoanRequestRecord>,
}

#[derive(Clone)]
pub struct CirculationService {
    db: Database,
    policy: CirculationPolicy,
    analytics: AnalyticsService,
    notifier: Arc<dyn Notifier>,
}

impl CirculationService {
    pub fn new(
        db: Database,
        policy: CirculationPolicy,
        analytics: AnalyticsService,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            policy,
            analytics,
            notifier,
        }
    }

    // ========================================================================
    // Loans
    // ========================================================================

    pub async fn checkout(&self, actor: &Actor, user_id: &str, copy_id: &str) -> ServiceResult<LoanRecord> {
        self.checkout_at(actor, user_id, copy_id, now_utc()).await
    }

    /// Lend a copy to `user_id`. Patrons may only borrow for themselves.
    pub async fn checkout_at(
        &self,
        actor: &Actor,
        user_id: &str,
        copy_id: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<LoanRecord> {
        let now = to_storage(now);
        actor.require_owner_or_staff(user_id)?;
        let borrower = self.load_user(user_id).await?;
        if !borrower.is_active {
            return Err(ServiceError::invalid_state("Borrower account is not active"));
        }
        self.ensure_no_unpaid_fines(user_id).await?;

        let copy = self
            .db
            .catalog()
            .get_copy(copy_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Book copy not found"))?;

        let due = rules::due_date(now, borrower.membership_type);
        let loan = self
            .db
            .loans()
            .checkout(user_id, copy_id, now, due)
            .await?
            .ok_or_else(|| ServiceError::conflict("Copy is not available"))?;

        self.fulfill_reservation_for(user_id, &copy.book_id).await;
        self.record_checkout(user_id, &copy.book_id).await;

        info!(loan_id = %loan.id, user_id = %user_id, copy_id = %copy_id, due = %loan.due_date, "Book checked out");
        Ok(loan)
    }

    pub async fn get_loan(&self, actor: &Actor, id: &str) -> ServiceResult<LoanRecord> {
        let loan = self.load_loan(id).await?;
        actor.require_owner_or_staff(&loan.user_id)?;
        Ok(loan)
    }

    pub async fn list_loans(&self, actor: &Actor, mut filter: LoanFilter) -> ServiceResult<Vec<LoanRecord>> {
        filter.user_id = actor.visible_owner(filter.user_id.take());
        Ok(self.db.loans().list(&filter).await?)
    }

    pub async fn return_loan(&self, actor: &Actor, id: &str) -> ServiceResult<ReturnOutcome> {
        self.return_loan_at(actor, id, now_utc()).await
    }

    /// Close an open loan, freeing the copy and charging for late days
    pub async fn return_loan_at(
        &self,
        actor: &Actor,
        id: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<ReturnOutcome> {
        let now = to_storage(now);
        let loan = self.load_loan(id).await?;
        actor.require_owner_or_staff(&loan.user_id)?;
        if !loan.status.is_open() {
            return Err(ServiceError::invalid_state(format!(
                "Loan is {:?} and cannot be returned",
                loan.status
            )));
        }

        let late_days = rules::days_overdue(loan.due_date, now);
        let fine = rules::overdue_fine(late_days, self.policy.fine_per_day).map(|(amount, reason)| NewFine {
            amount: decimal_to_str(amount),
            reason,
        });

        let fine = self
            .db
            .loans()
            .complete_return(&loan.id, &loan.book_copy_id, now, fine)
            .await?;

        let mut event = CreateAnalyticsEvent::new(EventType::Return, Some(&loan.user_id));
        event.book_id = self.book_of_copy(&loan.book_copy_id).await;
        self.analytics.record(event).await;

        if let Some(ref fine) = fine {
            self.notifier
                .notify(
                    &loan.user_id,
                    NotificationCategory::Circulation,
                    "Overdue fine",
                    &format!("A fine of {} was added: {}.", fine.amount, fine.reason),
                )
                .await;
        }

        info!(loan_id = %loan.id, late_days, fined = fine.is_some(), "Book returned");
        Ok(ReturnOutcome {
            loan: self.load_loan(id).await?,
            fine,
        })
    }

    pub async fn renew(&self, actor: &Actor, id: &str) -> ServiceResult<LoanRecord> {
        self.renew_at(actor, id, now_utc()).await
    }

    /// Restart the loan for the renewal period, counted from `now`
    pub async fn renew_at(&self, actor: &Actor, id: &str, now: DateTime<Utc>) -> ServiceResult<LoanRecord> {
        let now = to_storage(now);
        let loan = self.load_loan(id).await?;
        actor.require_owner_or_staff(&loan.user_id)?;

        if loan.status != LoanStatus::Active {
            return Err(ServiceError::invalid_state("Only active loans can be renewed"));
        }
        if now > loan.due_date {
            return Err(ServiceError::invalid_state("Loan is past due and cannot be renewed"));
        }
        if loan.renewal_count >= self.policy.max_renewals {
            return Err(ServiceError::invalid_state(format!(
                "Loan has already been renewed {} times",
                loan.renewal_count
            )));
        }

        let new_due = rules::renewed_due_date(now, self.policy.renewal_days);
        if !self
            .db
            .loans()
            .renew(&loan.id, new_due, self.policy.max_renewals)
            .await?
        {
            return Err(ServiceError::invalid_state("Loan changed while renewing"));
        }

        info!(loan_id = %loan.id, due = %new_due, "Loan renewed");
        self.load_loan(id).await
    }

    pub async fn mark_lost(&self, actor: &Actor, id: &str) -> ServiceResult<LoanRecord> {
        actor.require_staff()?;
        let loan = self.load_loan(id).await?;
        if !self.db.loans().mark_lost(&loan.id, &loan.book_copy_id).await? {
            return Err(ServiceError::invalid_state("Only open loans can be marked lost"));
        }
        info!(loan_id = %loan.id, copy_id = %loan.book_copy_id, "Loan marked lost");
        self.load_loan(id).await
    }

    /// Sweep: flag active loans whose due date has passed
    pub async fn mark_overdue_loans(&self, now: DateTime<Utc>) -> ServiceResult<u64> {
        let now = to_storage(now);
        let count = self.db.loans().mark_overdue(now).await?;
        if count > 0 {
            info!(count, "Loans marked overdue");
        }
        Ok(count)
    }

    // ========================================================================
    // Reservations
    // ========================================================================

    pub async fn reserve(&self, actor: &Actor, book_id: &str) -> ServiceResult<ReservationRecord> {
        self.reserve_at(actor, book_id, now_utc()).await
    }

    /// Hold a book that has no copy on the shelf
    pub async fn reserve_at(
        &self,
        actor: &Actor,
        book_id: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<ReservationRecord> {
        let now = to_storage(now);
        let catalog = self.db.catalog();
        if catalog.get_book(book_id).await?.is_none() {
            return Err(ServiceError::not_found("Book not found"));
        }
        let (_, available) = catalog.copy_counts(book_id).await?;
        if available > 0 {
            return Err(ServiceError::invalid_state(
                "Book has available copies; borrow one instead",
            ));
        }

        let expiry = now + Duration::days(self.policy.reservation_hold_days);
        let reservation = self
            .db
            .reservations()
            .create_if_none_active(&actor.user_id, book_id, now, expiry)
            .await?
            .ok_or_else(|| ServiceError::conflict("You already have an active reservation for this book"))?;

        let mut event = CreateAnalyticsEvent::new(EventType::Reservation, Some(&actor.user_id));
        event.book_id = Some(book_id.to_string());
        self.analytics.record(event).await;

        info!(reservation_id = %reservation.id, user_id = %actor.user_id, book_id = %book_id, "Book reserved");
        Ok(reservation)
    }

    pub async fn list_reservations(
        &self,
        actor: &Actor,
        user_id: Option<String>,
        status: Option<ReservationStatus>,
    ) -> ServiceResult<Vec<ReservationRecord>> {
        let owner = actor.visible_owner(user_id);
        Ok(self.db.reservations().list(owner.as_deref(), status).await?)
    }

    pub async fn cancel_reservation(&self, actor: &Actor, id: &str) -> ServiceResult<ReservationRecord> {
        let reservation = self.load_reservation(id).await?;
        actor.require_owner_or_staff(&reservation.user_id)?;
        self.close_reservation(&reservation, ReservationStatus::Cancelled).await
    }

    pub async fn fulfill_reservation(&self, actor: &Actor, id: &str) -> ServiceResult<ReservationRecord> {
        actor.require_staff()?;
        let reservation = self.load_reservation(id).await?;
        self.close_reservation(&reservation, ReservationStatus::Fulfilled).await
    }

    /// Sweep: expire active reservations past their hold
    pub async fn expire_reservations(&self, now: DateTime<Utc>) -> ServiceResult<u64> {
        let now = to_storage(now);
        let count = self.db.reservations().expire_due(now).await?;
        if count > 0 {
            info!(count, "Reservations expired");
        }
        Ok(count)
    }

    // ========================================================================
    // Fines
    // ========================================================================

    pub async fn list_fines(
        &self,
        actor: &Actor,
        user_id: Option<String>,
        status: Option<FineStatus>,
    ) -> ServiceResult<Vec<FineRecord>> {
        let loans = self.db.loans();
        let fines = match actor.visible_owner(user_id) {
            Some(owner) => loans.fines_for_user(&owner, status).await?,
            None => loans.list_fines(status).await?,
        };
        Ok(fines)
    }

    pub async fn pay_fine(&self, actor: &Actor, id: &str) -> ServiceResult<FineRecord> {
        let fine = self.load_fine(id).await?;
        let loan = self.load_loan(&fine.loan_id).await?;
        actor.require_owner_or_staff(&loan.user_id)?;
        self.settle(&fine, FineStatus::Paid).await
    }

    pub async fn waive_fine(&self, actor: &Actor, id: &str) -> ServiceResult<FineRecord> {
        actor.require_staff()?;
        let fine = self.load_fine(id).await?;
        self.settle(&fine, FineStatus::Waived).await
    }

    // ========================================================================
    // Loan requests
    // ========================================================================

    pub async fn request_loan(&self, actor: &Actor, book_id: &str, notes: &str) -> ServiceResult<LoanRequestRecord> {
        self.request_loan_at(actor, book_id, notes, now_utc()).await
    }

    /// Ask staff for the first available copy of a book
    pub async fn request_loan_at(
        &self,
        actor: &Actor,
        book_id: &str,
        notes: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<LoanRequestRecord> {
        let now = to_storage(now);
        let catalog = self.db.catalog();
        if catalog.get_book(book_id).await?.is_none() {
            return Err(ServiceError::not_found("Book not found"));
        }
        self.ensure_no_unpaid_fines(&actor.user_id).await?;

        if self.db.loans().has_open_loan_for_book(&actor.user_id, book_id).await? {
            return Err(ServiceError::conflict("You already have this book on loan"));
        }
        let requests = self.db.loan_requests();
        if requests.has_pending_for_book(&actor.user_id, book_id).await? {
            return Err(ServiceError::conflict("You already have a pending request for this book"));
        }

        let copy = catalog
            .first_available_copy(book_id)
            .await?
            .ok_or_else(|| ServiceError::invalid_state("No copies of this book are available"))?;

        let expiry = now + Duration::hours(self.policy.loan_request_ttl_hours);
        let request = requests
            .create(&actor.user_id, &copy.id, now, expiry, notes.trim())
            .await?;

        info!(request_id = %request.id, user_id = %actor.user_id, copy_id = %copy.id, "Loan requested");
        Ok(request)
    }

    pub async fn get_request(&self, actor: &Actor, id: &str) -> ServiceResult<LoanRequestRecord> {
        let request = self.load_request(id).await?;
        actor.require_owner_or_staff(&request.user_id)?;
        Ok(request)
    }

    pub async fn list_requests(
        &self,
        actor: &Actor,
        user_id: Option<String>,
        status: Option<LoanRequestStatus>,
    ) -> ServiceResult<Vec<LoanRequestRecord>> {
        let owner = actor.visible_owner(user_id);
        Ok(self.db.loan_requests().list(owner.as_deref(), status).await?)
    }

    pub async fn approve_request(&self, actor: &Actor, id: &str) -> ServiceResult<LoanRequestRecord> {
        self.approve_request_at(actor, id, now_utc()).await
    }

    /// Approve a pending request, lending the copy in the same step. A request
    /// past its expiry is expired instead.
    pub async fn approve_request_at(
        &self,
        actor: &Actor,
        id: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<LoanRequestRecord> {
        let now = to_storage(now);
        actor.require_staff()?;
        let request = self.load_request(id).await?;
        ensure_transition(request.status, LoanRequestStatus::Approved)?;

        let requests = self.db.loan_requests();
        if request.expiry_date < now {
            requests
                .close(&request.id, LoanRequestStatus::Expired, None, None, now)
                .await?;
            info!(request_id = %request.id, "Loan request expired on approval");
            return Err(ServiceError::invalid_state("Loan request has expired"));
        }

        let borrower = self.load_user(&request.user_id).await?;
        let due = rules::due_date(now, borrower.membership_type);
        let outcome = requests
            .approve(&request.id, &actor.user_id, &request.user_id, &request.book_copy_id, now, due)
            .await?;

        match outcome {
            ApproveOutcome::Approved { loan_id } => {
                if let Some(book_id) = self.book_of_copy(&request.book_copy_id).await {
                    self.record_checkout(&request.user_id, &book_id).await;
                }
                self.notifier
                    .notify(
                        &request.user_id,
                        NotificationCategory::LoanRequest,
                        "Loan request approved",
                        &format!("Your loan request was approved. The book is due back on {}.", due.date_naive()),
                    )
                    .await;
                info!(request_id = %request.id, loan_id = %loan_id, processed_by = %actor.user_id, "Loan request approved");
            }
            ApproveOutcome::NotPending => {
                return Err(ServiceError::invalid_state("Loan request is no longer pending"));
            }
            ApproveOutcome::CopyUnavailable => {
                return Err(ServiceError::conflict("The requested copy is no longer available"));
            }
        }

        self.load_request(id).await
    }

    pub async fn reject_request(&self, actor: &Actor, id: &str, reason: &str) -> ServiceResult<LoanRequestRecord> {
        actor.require_staff()?;
        let request = self.load_request(id).await?;
        self.close_request(&request, LoanRequestStatus::Rejected, Some(&actor.user_id), Some(reason.trim()))
            .await?;

        let mut message = String::from("Your loan request was rejected.");
        if !reason.trim().is_empty() {
            message.push_str(&format!(" Reason: {}", reason.trim()));
        }
        self.notifier
            .notify(&request.user_id, NotificationCategory::LoanRequest, "Loan request rejected", &message)
            .await;

        self.load_request(id).await
    }

    /// Only the requester can withdraw a request
    pub async fn cancel_request(&self, actor: &Actor, id: &str) -> ServiceResult<LoanRequestRecord> {
        let request = self.load_request(id).await?;
        if request.user_id != actor.user_id {
            return Err(ServiceError::forbidden("You can only cancel your own requests"));
        }
        self.close_request(&request, LoanRequestStatus::Cancelled, None, None)
            .await?;
        self.load_request(id).await
    }

    /// Sweep: expire pending requests nobody processed in time
    pub async fn expire_requests(&self, now: DateTime<Utc>) -> ServiceResult<usize> {
        let now = to_storage(now);
        let expired = self.db.loan_requests().expire_due(now).await?;
        for request in &expired {
            self.notifier
                .notify(
                    &request.user_id,
                    NotificationCategory::LoanRequest,
                    "Loan request expired",
                    "Your loan request expired before it was processed.",
                )
                .await;
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Loan requests expired");
        }
        Ok(expired.len())
    }

    // ========================================================================
    // Attendance
    // ========================================================================

    /// Record a visitor entering the library. Signed-in visitors are linked
    /// to their account and can hold one open visit at a time.
    pub async fn check_in(&self, actor: Option<&Actor>, input: CheckInInput) -> ServiceResult<AttendanceRecord> {
        self.check_in_at(actor, input, now_utc()).await
    }

    pub async fn check_in_at(
        &self,
        actor: Option<&Actor>,
        input: CheckInInput,
        now: DateTime<Utc>,
    ) -> ServiceResult<AttendanceRecord> {
        let now = to_storage(now);
        let registration_number = input.registration_number.trim().to_string();
        let full_name = input.full_name.trim().to_string();
        if registration_number.is_empty() || full_name.is_empty() {
            return Err(ServiceError::validation("Registration number and full name are required"));
        }

        let attendance = self.db.attendance();
        if let Some(actor) = actor
            && attendance.has_active_for_user(&actor.user_id).await?
        {
            return Err(ServiceError::conflict("You are already checked in"));
        }

        let record = attendance
            .check_in(
                CreateAttendance {
                    user_id: actor.map(|a| a.user_id.clone()),
                    registration_number,
                    full_name,
                    department: input.department.trim().to_string(),
                    faculty: input.faculty.trim().to_string(),
                    phone: input.phone.trim().to_string(),
                    purpose: input.purpose.trim().to_string(),
                },
                now,
            )
            .await?;

        info!(attendance_id = %record.id, registration_number = %record.registration_number, "Visitor checked in");
        Ok(record)
    }

    pub async fn check_out(&self, actor: &Actor, id: &str) -> ServiceResult<AttendanceRecord> {
        self.check_out_at(actor, id, now_utc()).await
    }

    /// Close a visit. Walk-in visits without an account are closed by staff.
    pub async fn check_out_at(
        &self,
        actor: &Actor,
        id: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<AttendanceRecord> {
        let now = to_storage(now);
        let record = self.load_attendance(id).await?;
        match record.user_id.as_deref() {
            Some(owner) => actor.require_owner_or_staff(owner)?,
            None => actor.require_staff()?,
        }

        let attendance = self.db.attendance();
        if !attendance.check_out(id, now).await? {
            return Err(ServiceError::invalid_state("Visitor is already checked out"));
        }
        info!(attendance_id = %id, "Visitor checked out");
        self.load_attendance(id).await
    }

    /// Close several visits at once; returns how many were still open
    pub async fn bulk_check_out(&self, actor: &Actor, ids: &[String]) -> ServiceResult<u64> {
        actor.require_staff()?;
        let attendance = self.db.attendance();
        let now = now_utc();

        let mut closed = 0;
        for id in ids {
            if attendance.check_out(id, now).await? {
                closed += 1;
            }
        }
        info!(requested = ids.len(), closed, "Bulk check-out");
        Ok(closed)
    }

    pub async fn list_attendance(
        &self,
        actor: &Actor,
        mut filter: AttendanceFilter,
    ) -> ServiceResult<Vec<AttendanceRecord>> {
        filter.user_id = actor.visible_owner(filter.user_id.take());
        Ok(self.db.attendance().list(&filter).await?)
    }

    /// Attendance records as CSV, newest first
    pub async fn export_attendance_csv(&self, actor: &Actor, filter: AttendanceFilter) -> ServiceResult<String> {
        actor.require_staff()?;
        let records = self.db.attendance().list(&filter).await?;

        let mut out = String::from(
            "Registration Number,Full Name,Department,Faculty,Phone,Purpose,Check In,Check Out,Duration (minutes),Status\n",
        );
        for record in &records {
            let row = [
                record.registration_number.clone(),
                record.full_name.clone(),
                record.department.clone(),
                record.faculty.clone(),
                record.phone.clone(),
                record.purpose.clone(),
                record.check_in.format("%Y-%m-%d %H:%M:%S").to_string(),
                record
                    .check_out
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default(),
                record.duration_minutes().map(|m| m.to_string()).unwrap_or_default(),
                record.status.label().to_string(),
            ];
            let cells: Vec<String> = row.iter().map(|cell| csv_cell(cell)).collect();
            out.push_str(&cells.join(","));
            out.push('\n');
        }

        info!(rows = records.len(), user_id = %actor.user_id, "Attendance exported");
        Ok(out)
    }

    // ========================================================================
    // Dashboards
    // ========================================================================

    pub async fn patron_dashboard(&self, actor: &Actor) -> ServiceResult<PatronDashboard> {
        self.patron_dashboard_at(actor, now_utc()).await
    }

    pub async fn patron_dashboard_at(&self, actor: &Actor, now: DateTime<Utc>) -> ServiceResult<PatronDashboard> {
        let now = to_storage(now);
        let user_id = actor.user_id.as_str();
        let loans = self.db.loans();

        let open_loans: Vec<LoanRecord> = loans
            .list(&LoanFilter {
                user_id: Some(user_id.to_string()),
                ..Default::default()
            })
            .await?
            .into_iter()
            .filter(|l| l.status.is_open())
            .collect();
        let due_soon = loans
            .due_between(user_id, now, now + Duration::days(DUE_SOON_DAYS))
            .await?;
        let unpaid_fines = loans.fines_for_user(user_id, Some(FineStatus::Unpaid)).await?;
        let total_unpaid = sum_amounts(unpaid_fines.iter().map(|f| f.amount.as_str()))?;

        Ok(PatronDashboard {
            open_loans,
            due_soon,
            active_reservations: self
                .db
                .reservations()
                .list(Some(user_id), Some(ReservationStatus::Active))
                .await?,
            pending_requests: self
                .db
                .loan_requests()
                .list(Some(user_id), Some(LoanRequestStatus::Pending))
                .await?,
            can_borrow: unpaid_fines.is_empty(),
            unpaid_fines,
            total_unpaid: decimal_to_str(total_unpaid),
        })
    }

    pub async fn staff_dashboard(&self, actor: &Actor) -> ServiceResult<StaffDashboard> {
        actor.require_staff()?;
        let loans = self.db.loans();
        let requests = self.db.loan_requests();

        let amounts = loans.unpaid_amounts(None).await?;
        let outstanding = sum_amounts(amounts.iter().map(String::as_str))?;

        Ok(StaffDashboard {
            active_loans: loans.count_by_status(LoanStatus::Active).await?,
            overdue_loans: loans.count_by_status(LoanStatus::Overdue).await?,
            pending_requests: requests.count_pending().await?,
            active_visitors: self.db.attendance().count_active().await?,
            outstanding_fines: decimal_to_str(outstanding),
            request_queue: requests.list(None, Some(LoanRequestStatus::Pending)).await?,
        })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn ensure_no_unpaid_fines(&self, user_id: &str) -> ServiceResult<()> {
        if self.db.loans().has_unpaid_fines(user_id).await? {
            return Err(ServiceError::invalid_state(
                "Unpaid fines must be settled before borrowing",
            ));
        }
        Ok(())
    }

    async fn record_checkout(&self, user_id: &str, book_id: &str) {
        let mut event = CreateAnalyticsEvent::new(EventType::Checkout, Some(user_id));
        event.book_id = Some(book_id.to_string());
        self.analytics.record(event).await;
        self.analytics.bump(ItemType::Book, book_id, 0, 1, 0).await;
    }

    /// A checkout satisfies the borrower's own hold on the book
    async fn fulfill_reservation_for(&self, user_id: &str, book_id: &str) {
        let reservations = self.db.reservations();
        let held = match reservations.list(Some(user_id), Some(ReservationStatus::Active)).await {
            Ok(held) => held,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to look up reservations");
                return;
            }
        };
        for reservation in held.iter().filter(|r| r.book_id == book_id) {
            if let Err(e) = reservations.close(&reservation.id, ReservationStatus::Fulfilled).await {
                warn!(reservation_id = %reservation.id, error = %e, "Failed to fulfill reservation");
            }
        }
    }

    async fn book_of_copy(&self, copy_id: &str) -> Option<String> {
        match self.db.catalog().get_copy(copy_id).await {
            Ok(copy) => copy.map(|c| c.book_id),
            Err(e) => {
                warn!(copy_id = %copy_id, error = %e, "Failed to load copy");
                None
            }
        }
    }

    async fn close_reservation(
        &self,
        reservation: &ReservationRecord,
        to: ReservationStatus,
    ) -> ServiceResult<ReservationRecord> {
        if !self.db.reservations().close(&reservation.id, to).await? {
            return Err(ServiceError::invalid_state(format!(
                "Reservation is {:?} and cannot become {:?}",
                reservation.status, to
            )));
        }
        info!(reservation_id = %reservation.id, status = ?to, "Reservation closed");
        self.load_reservation(&reservation.id).await
    }

    async fn close_request(
        &self,
        request: &LoanRequestRecord,
        to: LoanRequestStatus,
        processed_by: Option<&str>,
        notes: Option<&str>,
    ) -> ServiceResult<()> {
        ensure_transition(request.status, to)?;
        if !self
            .db
            .loan_requests()
            .close(&request.id, to, processed_by, notes, now_utc())
            .await?
        {
            return Err(ServiceError::invalid_state("Loan request is no longer pending"));
        }
        info!(request_id = %request.id, status = ?to, "Loan request closed");
        Ok(())
    }

    async fn settle(&self, fine: &FineRecord, to: FineStatus) -> ServiceResult<FineRecord> {
        if !self.db.loans().settle_fine(&fine.id, to).await? {
            return Err(ServiceError::invalid_state("Fine is already settled"));
        }
        info!(fine_id = %fine.id, status = ?to, amount = %fine.amount, "Fine settled");
        self.load_fine(&fine.id).await
    }

    async fn load_user(&self, id: &str) -> ServiceResult<UserRecord> {
        self.db
            .users()
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User not found"))
    }

    async fn load_loan(&self, id: &str) -> ServiceResult<LoanRecord> {
        self.db
            .loans()
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Loan not found"))
    }

    async fn load_fine(&self, id: &str) -> ServiceResult<FineRecord> {
        self.db
            .loans()
            .get_fine(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Fine not found"))
    }

    async fn load_reservation(&self, id: &str) -> ServiceResult<ReservationRecord> {
        self.db
            .reservations()
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Reservation not found"))
    }

    async fn load_request(&self, id: &str) -> ServiceResult<LoanRequestRecord> {
        self.db
            .loan_requests()
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Loan request not found"))
    }

    async fn load_attendance(&self, id: &str) -> ServiceResult<AttendanceRecord> {
        self.db
            .attendance()
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Attendance record not found"))
    }
}

fn ensure_transition(from: LoanRequestStatus, to: LoanRequestStatus) -> ServiceResult<()> {
    if rules::loan_request_transition_allowed(from, to) {
        Ok(())
    } else {
        Err(ServiceError::invalid_state(format!(
            "Loan request is {:?} and cannot become {:?}",
            from, to
        )))
    }
}

fn sum_amounts<'a>(amounts: impl Iterator<Item = &'a str>) -> ServiceResult<Decimal> {
    let mut total = Decimal::new(0, 2);
    for amount in amounts {
        total += str_to_decimal(amount)?;
    }
    Ok(total)
}

fn csv_cell(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CopyStatus, MembershipType};
    use crate::services::catalog::tests::seed_book;
    use crate::services::test_support::{member_actor, staff_actor, test_db, test_services};
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn visitor(name: &str) -> CheckInInput {
        CheckInInput {
            registration_number: format!("REG-{}", name),
            full_name: name.to_string(),
            department: "Physics".into(),
            purpose: "Study".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_checkout_sets_due_date_by_tier() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Faculty).await;
        let (_, copies) = seed_book(&services, &staff, "Dune", "9780306406157", 1).await;

        let now = Utc::now();
        let loan = services
            .circulation
            .checkout_at(&staff, &patron.user_id, &copies[0].id, now)
            .await
            .unwrap();

        assert_eq!(loan.due_date - loan.loan_date, Duration::days(30));
        assert_eq!(loan.status, LoanStatus::Active);
        let copy = db.catalog().get_copy(&copies[0].id).await.unwrap().unwrap();
        assert_eq!(copy.status, CopyStatus::CheckedOut);

        let other = member_actor(&db, "other", MembershipType::Student).await;
        assert_matches!(
            services.circulation.checkout(&other, &other.user_id, &copies[0].id).await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn test_patron_cannot_borrow_for_someone_else() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Student).await;
        let (_, copies) = seed_book(&services, &staff, "Dune", "9780306406157", 1).await;

        assert_matches!(
            services.circulation.checkout(&patron, &staff.user_id, &copies[0].id).await,
            Err(ServiceError::Forbidden(_))
        );
    }

    #[tokio::test]
    async fn test_late_return_creates_fine_and_blocks_borrowing() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Student).await;
        let (book, copies) = seed_book(&services, &staff, "Dune", "9780306406157", 2).await;

        let loaned_at = Utc::now() - Duration::days(17);
        let loan = services
            .circulation
            .checkout_at(&patron, &patron.user_id, &copies[0].id, loaned_at)
            .await
            .unwrap();

        let outcome = services
            .circulation
            .return_loan_at(&patron, &loan.id, loaned_at + Duration::days(17))
            .await
            .unwrap();
        assert_eq!(outcome.loan.status, LoanStatus::Returned);
        let fine = outcome.fine.unwrap();
        assert_eq!(fine.amount, "300.00");
        assert_eq!(fine.reason, "Overdue return: 3 days");

        let copy = db.catalog().get_copy(&copies[0].id).await.unwrap().unwrap();
        assert_eq!(copy.status, CopyStatus::Available);

        assert_matches!(
            services.circulation.checkout(&patron, &patron.user_id, &copies[1].id).await,
            Err(ServiceError::InvalidState(_))
        );
        assert_matches!(
            services.circulation.request_loan(&patron, &book.id, "").await,
            Err(ServiceError::InvalidState(_))
        );

        services.circulation.pay_fine(&patron, &fine.id).await.unwrap();
        assert_matches!(
            services.circulation.pay_fine(&patron, &fine.id).await,
            Err(ServiceError::InvalidState(_))
        );
        services
            .circulation
            .checkout(&patron, &patron.user_id, &copies[1].id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_on_time_return_has_no_fine_and_cannot_repeat() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Student).await;
        let (_, copies) = seed_book(&services, &staff, "Dune", "9780306406157", 1).await;

        let loan = services
            .circulation
            .checkout(&patron, &patron.user_id, &copies[0].id)
            .await
            .unwrap();
        let outcome = services.circulation.return_loan(&staff, &loan.id).await.unwrap();
        assert!(outcome.fine.is_none());
        assert_matches!(
            services.circulation.return_loan(&staff, &loan.id).await,
            Err(ServiceError::InvalidState(_))
        );
    }

    #[tokio::test]
    async fn test_stored_timestamps_drop_subseconds() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Student).await;
        let (_, copies) = seed_book(&services, &staff, "Dune", "9780306406157", 1).await;

        let precise = now_utc() + Duration::milliseconds(250);
        let loan = services
            .circulation
            .checkout_at(&patron, &patron.user_id, &copies[0].id, precise)
            .await
            .unwrap();
        assert_eq!(loan.loan_date, to_storage(precise));
        assert_eq!(loan.loan_date.timestamp_subsec_nanos(), 0);
        assert_eq!(loan.due_date.timestamp_subsec_nanos(), 0);

        let renewed = services
            .circulation
            .renew_at(&patron, &loan.id, precise + Duration::milliseconds(300))
            .await
            .unwrap();
        assert_eq!(renewed.due_date.timestamp_subsec_nanos(), 0);
    }

    #[tokio::test]
    async fn test_renewal_runs_from_now_up_to_limit() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Student).await;
        let (_, copies) = seed_book(&services, &staff, "Dune", "9780306406157", 1).await;

        let now = now_utc();
        let loan = services
            .circulation
            .checkout_at(&patron, &patron.user_id, &copies[0].id, now - Duration::days(10))
            .await
            .unwrap();

        let renewed = services.circulation.renew_at(&patron, &loan.id, now).await.unwrap();
        assert_eq!(renewed.due_date, now + Duration::days(7));
        assert_eq!(renewed.renewal_count, 1);

        let later = now + Duration::days(5);
        let again = services.circulation.renew_at(&patron, &loan.id, later).await.unwrap();
        assert_eq!(again.due_date, later + Duration::days(7));
        assert_matches!(
            services.circulation.renew_at(&patron, &loan.id, later).await,
            Err(ServiceError::InvalidState(_))
        );
    }

    #[tokio::test]
    async fn test_past_due_loan_cannot_be_renewed() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Student).await;
        let (_, copies) = seed_book(&services, &staff, "Dune", "9780306406157", 1).await;

        let now = Utc::now();
        let loan = services
            .circulation
            .checkout_at(&patron, &patron.user_id, &copies[0].id, now - Duration::days(20))
            .await
            .unwrap();
        assert_matches!(
            services.circulation.renew_at(&patron, &loan.id, now).await,
            Err(ServiceError::InvalidState(_))
        );

        assert_eq!(services.circulation.mark_overdue_loans(now).await.unwrap(), 1);
        let loan = services.circulation.get_loan(&patron, &loan.id).await.unwrap();
        assert_eq!(loan.status, LoanStatus::Overdue);
    }

    #[tokio::test]
    async fn test_mark_lost_is_staff_only() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Student).await;
        let (_, copies) = seed_book(&services, &staff, "Dune", "9780306406157", 1).await;
        let loan = services
            .circulation
            .checkout(&patron, &patron.user_id, &copies[0].id)
            .await
            .unwrap();

        assert_matches!(
            services.circulation.mark_lost(&patron, &loan.id).await,
            Err(ServiceError::Forbidden(_))
        );
        let lost = services.circulation.mark_lost(&staff, &loan.id).await.unwrap();
        assert_eq!(lost.status, LoanStatus::Lost);
        let copy = db.catalog().get_copy(&copies[0].id).await.unwrap().unwrap();
        assert_eq!(copy.status, CopyStatus::Lost);
    }

    #[tokio::test]
    async fn test_reservation_only_when_nothing_on_shelf() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let first = member_actor(&db, "first", MembershipType::Student).await;
        let second = member_actor(&db, "second", MembershipType::Student).await;
        let (book, copies) = seed_book(&services, &staff, "Dune", "9780306406157", 1).await;

        assert_matches!(
            services.circulation.reserve(&second, &book.id).await,
            Err(ServiceError::InvalidState(_))
        );

        let loan = services
            .circulation
            .checkout(&first, &first.user_id, &copies[0].id)
            .await
            .unwrap();
        let now = Utc::now();
        let reservation = services.circulation.reserve_at(&second, &book.id, now).await.unwrap();
        assert_eq!(reservation.expiry_date - reservation.reservation_date, Duration::days(7));
        assert_matches!(
            services.circulation.reserve(&second, &book.id).await,
            Err(ServiceError::Conflict(_))
        );

        // The reserving patron borrows the returned copy
        services.circulation.return_loan(&first, &loan.id).await.unwrap();
        services
            .circulation
            .checkout(&second, &second.user_id, &copies[0].id)
            .await
            .unwrap();
        let held = services
            .circulation
            .list_reservations(&second, None, Some(ReservationStatus::Fulfilled))
            .await
            .unwrap();
        assert_eq!(held.len(), 1);
    }

    #[tokio::test]
    async fn test_reservations_expire_and_cancel() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Student).await;
        let other = member_actor(&db, "other", MembershipType::Student).await;
        let (book, _) = seed_book(&services, &staff, "Dune", "9780306406157", 0).await;

        let now = Utc::now();
        let reservation = services.circulation.reserve_at(&patron, &book.id, now).await.unwrap();
        assert_matches!(
            services.circulation.cancel_reservation(&other, &reservation.id).await,
            Err(ServiceError::Forbidden(_))
        );

        let swept = services
            .circulation
            .expire_reservations(now + Duration::days(8))
            .await
            .unwrap();
        assert_eq!(swept, 1);
        assert_matches!(
            services.circulation.cancel_reservation(&patron, &reservation.id).await,
            Err(ServiceError::InvalidState(_))
        );
    }

    #[tokio::test]
    async fn test_loan_request_approval_lends_copy() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Staff).await;
        let (book, copies) = seed_book(&services, &staff, "Dune", "9780306406157", 1).await;

        let request = services.circulation.request_loan(&patron, &book.id, "For thesis").await.unwrap();
        assert_eq!(request.book_copy_id, copies[0].id);
        assert_matches!(
            services.circulation.request_loan(&patron, &book.id, "").await,
            Err(ServiceError::Conflict(_))
        );
        assert_matches!(
            services.circulation.approve_request(&patron, &request.id).await,
            Err(ServiceError::Forbidden(_))
        );

        let approved = services.circulation.approve_request(&staff, &request.id).await.unwrap();
        assert_eq!(approved.status, LoanRequestStatus::Approved);
        assert_eq!(approved.processed_by.as_deref(), Some(staff.user_id.as_str()));

        let loan_id = approved.loan_id.unwrap();
        let loan = services.circulation.get_loan(&patron, &loan_id).await.unwrap();
        assert_eq!(loan.due_date - loan.loan_date, Duration::days(21));

        // Terminal states never move again
        assert_matches!(
            services.circulation.reject_request(&staff, &request.id, "late").await,
            Err(ServiceError::InvalidState(_))
        );
        assert_eq!(
            db.notifications().unread_count(&patron.user_id).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_approving_after_ttl_expires_request() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Student).await;
        let (book, _) = seed_book(&services, &staff, "Dune", "9780306406157", 1).await;

        let now = Utc::now();
        let request = services
            .circulation
            .request_loan_at(&patron, &book.id, "", now - Duration::hours(25))
            .await
            .unwrap();

        assert_matches!(
            services.circulation.approve_request_at(&staff, &request.id, now).await,
            Err(ServiceError::InvalidState(_))
        );
        let request = services.circulation.get_request(&patron, &request.id).await.unwrap();
        assert_eq!(request.status, LoanRequestStatus::Expired);
    }

    #[tokio::test]
    async fn test_approval_conflicts_when_copy_taken() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Student).await;
        let walk_in = member_actor(&db, "walk", MembershipType::Public).await;
        let (book, copies) = seed_book(&services, &staff, "Dune", "9780306406157", 1).await;

        let request = services.circulation.request_loan(&patron, &book.id, "").await.unwrap();
        services
            .circulation
            .checkout(&staff, &walk_in.user_id, &copies[0].id)
            .await
            .unwrap();

        assert_matches!(
            services.circulation.approve_request(&staff, &request.id).await,
            Err(ServiceError::Conflict(_))
        );
        let request = services.circulation.get_request(&patron, &request.id).await.unwrap();
        assert_eq!(request.status, LoanRequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancel_and_sweep_requests() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Student).await;
        let (first, _) = seed_book(&services, &staff, "Dune", "9780306406157", 1).await;
        let (second, _) = seed_book(&services, &staff, "Emma", "0306406152", 1).await;

        let mine = services.circulation.request_loan(&patron, &first.id, "").await.unwrap();
        assert_matches!(
            services.circulation.cancel_request(&staff, &mine.id).await,
            Err(ServiceError::Forbidden(_))
        );
        let cancelled = services.circulation.cancel_request(&patron, &mine.id).await.unwrap();
        assert_eq!(cancelled.status, LoanRequestStatus::Cancelled);

        let now = Utc::now();
        services
            .circulation
            .request_loan_at(&patron, &second.id, "", now)
            .await
            .unwrap();
        assert_eq!(services.circulation.expire_requests(now).await.unwrap(), 0);
        assert_eq!(
            services
                .circulation
                .expire_requests(now + Duration::hours(25))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_attendance_flow_and_export() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Student).await;

        let mine = services
            .circulation
            .check_in(Some(&patron), visitor("Pat"))
            .await
            .unwrap();
        assert_matches!(
            services.circulation.check_in(Some(&patron), visitor("Pat")).await,
            Err(ServiceError::Conflict(_))
        );

        let mut walk_in = visitor("Doe, Jane");
        walk_in.purpose = "Say \"hi\"".into();
        let anonymous = services.circulation.check_in(None, walk_in).await.unwrap();
        assert_matches!(
            services.circulation.check_out(&patron, &anonymous.id).await,
            Err(ServiceError::Forbidden(_))
        );

        let closed = services.circulation.check_out(&patron, &mine.id).await.unwrap();
        assert_eq!(closed.status, AttendanceStatus::CheckedOut);
        assert_matches!(
            services.circulation.check_out(&patron, &mine.id).await,
            Err(ServiceError::InvalidState(_))
        );

        let ids = vec![mine.id.clone(), anonymous.id.clone()];
        assert_eq!(services.circulation.bulk_check_out(&staff, &ids).await.unwrap(), 1);

        let visible = services
            .circulation
            .list_attendance(&patron, AttendanceFilter::default())
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);

        let csv = services
            .circulation
            .export_attendance_csv(&staff, AttendanceFilter::default())
            .await
            .unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.contains("\"Doe, Jane\""));
        assert!(csv.contains("\"Say \"\"hi\"\"\""));
        assert_matches!(
            services
                .circulation
                .export_attendance_csv(&patron, AttendanceFilter::default())
                .await,
            Err(ServiceError::Forbidden(_))
        );
    }

    #[tokio::test]
    async fn test_dashboards_summarize_activity() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Student).await;
        let (book, copies) = seed_book(&services, &staff, "Dune", "9780306406157", 2).await;

        let now = Utc::now();
        let late = services
            .circulation
            .checkout_at(&patron, &patron.user_id, &copies[0].id, now - Duration::days(16))
            .await
            .unwrap();
        services.circulation.return_loan_at(&patron, &late.id, now).await.unwrap();
        services.circulation.check_in(Some(&patron), visitor("Pat")).await.unwrap();

        let dashboard = services.circulation.patron_dashboard_at(&patron, now).await.unwrap();
        assert!(!dashboard.can_borrow);
        assert_eq!(dashboard.total_unpaid, "200.00");
        assert!(dashboard.open_loans.is_empty());

        let fine_id = dashboard.unpaid_fines[0].id.clone();
        services.circulation.waive_fine(&staff, &fine_id).await.unwrap();
        services.circulation.checkout(&patron, &patron.user_id, &copies[1].id).await.unwrap();
        services.circulation.request_loan(&staff, &book.id, "").await.unwrap();

        let summary = services.circulation.staff_dashboard(&staff).await.unwrap();
        assert_eq!(summary.active_loans, 1);
        assert_eq!(summary.pending_requests, 1);
        assert_eq!(summary.active_visitors, 1);
        assert_eq!(summary.outstanding_fines, "0.00");
        assert_matches!(
            services.circulation.staff_dashboard(&patron).await,
            Err(ServiceError::Forbidden(_))
        );
    }
}
