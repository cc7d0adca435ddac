//! Integration tests for circulation
//!
//! These drive the public service layer end to end against an in-memory
//! database:
//! - Loan periods per membership tier
//! - Overdue fines on return and the borrowing block they cause
//! - Room booking overlap rules
//! - Request state machines

use assert_matches::assert_matches;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;

use stacks::config::CirculationPolicy;
use stacks::db::{
    CopyCondition, CopyStatus, CreateBookCopy, Database, FineStatus, LoanRequestStatus,
    MembershipType, PermissionRequestStatus, RoomType,
};
use stacks::services::rules;
use stacks::services::{
    Actor, AuthConfig, BookingRequest, NewBook, RegisterInput, ServiceError, Services,
    create_metrics_collector,
};

// ============================================================================
// Fixtures
// ============================================================================

async fn services() -> Services {
    let db = Database::connect_in_memory().await.unwrap();
    Services::build(
        db,
        AuthConfig {
            jwt_secret: "integration-secret".into(),
            token_lifetime_secs: 3600,
            bcrypt_cost: 4,
        },
        CirculationPolicy::default(),
        create_metrics_collector(),
    )
}

/// Register through the public flow and resolve the caller from the token
async fn sign_up(services: &Services, username: &str, membership: MembershipType) -> Actor {
    let payload = services
        .accounts
        .register(RegisterInput {
            username: username.into(),
            email: format!("{}@uni.edu", username),
            password: "correct horse".into(),
            first_name: username.into(),
            last_name: "Reader".into(),
            membership_type: membership,
            department: "History".into(),
            student_id: None,
            faculty_id: None,
            staff_id: None,
            phone: String::new(),
        })
        .await
        .unwrap();
    let token = payload.token.expect("active accounts get a token");
    services.auth.authenticate(&token.token).await.unwrap()
}

/// One book with a single shelved copy; returns the copy id
async fn shelve_book(services: &Services, admin: &Actor) -> (String, String) {
    let catalog = &services.catalog;
    let author = catalog.create_author(admin, "Mary Beard", "").await.unwrap();
    let publisher = catalog
        .create_publisher(admin, "Profile Books", "", "")
        .await
        .unwrap();
    let book = catalog
        .create_book(
            admin,
            NewBook {
                title: "SPQR".into(),
                isbn: "978-0-306-40615-7".into(),
                author_ids: vec![author.id],
                publisher_id: publisher.id,
                faculty_id: None,
                department_id: None,
                topic_id: None,
                genre_id: None,
                description: String::new(),
                publication_date: NaiveDate::from_ymd_opt(2015, 10, 20).unwrap(),
                edition: "1st".into(),
                pages: 608,
                language: None,
            },
        )
        .await
        .unwrap();
    let copy = catalog
        .create_copy(
            admin,
            CreateBookCopy {
                book_id: book.id.clone(),
                barcode: "SPQR-001".into(),
                condition: CopyCondition::Good,
                acquisition_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                location: "Stack 4".into(),
            },
        )
        .await
        .unwrap();
    (book.id, copy.id)
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

// ============================================================================
// Loans and fines
// ============================================================================

#[test]
fn loan_periods_follow_membership_tier() {
    let loaned = at(1, 9);
    let days = |m| (rules::due_date(loaned, m) - loaned).num_days();
    assert_eq!(days(MembershipType::Student), 14);
    assert_eq!(days(MembershipType::Faculty), 30);
    assert_eq!(days(MembershipType::Staff), 21);
    assert_eq!(days(MembershipType::Public), 7);
}

#[test]
fn fines_accrue_per_calendar_day_late() {
    let due = at(10, 17);
    assert_eq!(rules::days_overdue(due, at(10, 23)), 0);
    assert_eq!(rules::days_overdue(due, at(12, 8)), 2);
    assert_eq!(rules::overdue_fine(0, Decimal::new(100, 2)), None);

    let (amount, reason) = rules::overdue_fine(2, Decimal::new(150, 2)).unwrap();
    assert_eq!(amount.to_string(), "3.00");
    assert!(reason.contains("2 days"));
}

#[tokio::test]
async fn late_return_blocks_borrowing_until_fine_is_paid() {
    let services = services().await;
    let admin = sign_up(&services, "head", MembershipType::Staff).await;
    assert!(admin.is_admin());
    let (_, copy_id) = shelve_book(&services, &admin).await;
    let reader = sign_up(&services, "reader", MembershipType::Student).await;

    let loan = services
        .circulation
        .checkout_at(&reader, &reader.user_id, &copy_id, at(1, 10))
        .await
        .unwrap();
    assert_eq!(loan.due_date, at(15, 10));
    assert_eq!(
        services.catalog.get_copy(&copy_id).await.unwrap().status,
        CopyStatus::CheckedOut
    );

    let outcome = services
        .circulation
        .return_loan_at(&reader, &loan.id, at(18, 12))
        .await
        .unwrap();
    let fine = outcome.fine.expect("three days late");
    assert_eq!(fine.amount, "300.00");
    assert_eq!(fine.status, FineStatus::Unpaid);

    assert_matches!(
        services
            .circulation
            .checkout_at(&reader, &reader.user_id, &copy_id, at(19, 10))
            .await,
        Err(ServiceError::InvalidState(_))
    );

    services.circulation.pay_fine(&reader, &fine.id).await.unwrap();
    assert_matches!(
        services.circulation.pay_fine(&reader, &fine.id).await,
        Err(ServiceError::InvalidState(_))
    );
    services
        .circulation
        .checkout_at(&reader, &reader.user_id, &copy_id, at(19, 10))
        .await
        .unwrap();
}

#[tokio::test]
async fn patrons_cannot_borrow_for_someone_else() {
    let services = services().await;
    let admin = sign_up(&services, "head", MembershipType::Staff).await;
    let (_, copy_id) = shelve_book(&services, &admin).await;
    let alice = sign_up(&services, "alice", MembershipType::Public).await;
    let bob = sign_up(&services, "bob", MembershipType::Public).await;

    assert_matches!(
        services.circulation.checkout(&alice, &bob.user_id, &copy_id).await,
        Err(ServiceError::Forbidden(_))
    );
    services
        .circulation
        .checkout(&admin, &bob.user_id, &copy_id)
        .await
        .unwrap();
    assert_matches!(
        services.circulation.checkout(&alice, &alice.user_id, &copy_id).await,
        Err(ServiceError::Conflict(_))
    );
}

// ============================================================================
// Study rooms
// ============================================================================

#[test]
fn touching_slots_do_not_overlap() {
    let t = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
    assert!(rules::slots_overlap(t(9), t(11), t(10), t(12)));
    assert!(rules::slots_overlap(t(9), t(12), t(10), t(11)));
    assert!(!rules::slots_overlap(t(9), t(10), t(10), t(11)));
    assert!(!rules::slots_overlap(t(13), t(14), t(10), t(11)));
}

#[tokio::test]
async fn overlapping_room_bookings_conflict() {
    let services = services().await;
    let admin = sign_up(&services, "head", MembershipType::Staff).await;
    let room = services
        .study_rooms
        .create_room(
            &admin,
            stacks::db::CreateRoom {
                name: "Quiet Room 1".into(),
                room_type: RoomType::Individual,
                capacity: 2,
                features: String::new(),
                location: "Level 2".into(),
            },
        )
        .await
        .unwrap();
    let reader = sign_up(&services, "reader", MembershipType::Student).await;
    let other = sign_up(&services, "other", MembershipType::Faculty).await;

    let date = (Utc::now() + Duration::days(3)).date_naive();
    let t = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
    let request = |start, end| BookingRequest {
        room_id: room.id.clone(),
        date,
        start_time: t(start),
        end_time: t(end),
        number_of_people: 1,
        purpose: "Revision".into(),
    };

    services.study_rooms.book_room(&reader, request(10, 12)).await.unwrap();
    assert_matches!(
        services.study_rooms.book_room(&other, request(11, 13)).await,
        Err(ServiceError::Conflict(_))
    );
    services.study_rooms.book_room(&other, request(12, 13)).await.unwrap();
}

// ============================================================================
// Request state machines
// ============================================================================

#[test]
fn only_pending_requests_move() {
    use LoanRequestStatus as L;
    assert!(rules::loan_request_transition_allowed(L::Pending, L::Approved));
    assert!(rules::loan_request_transition_allowed(L::Pending, L::Expired));
    assert!(!rules::loan_request_transition_allowed(L::Approved, L::Rejected));
    assert!(!rules::loan_request_transition_allowed(L::Pending, L::Pending));

    use PermissionRequestStatus as P;
    assert!(rules::permission_request_transition_allowed(P::Pending, P::Approved));
    assert!(!rules::permission_request_transition_allowed(P::Rejected, P::Approved));
}
