//! GraphQL type definitions
//!
//! These mirror the repository records, decorated with async-graphql
//! attributes. Storage enums are exposed as-is; relations that need another
//! lookup are resolved through [ComplexObject] impls.

use async_graphql::{ComplexObject, Context, InputObject, Json, Result, SimpleObject};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use stacks_macros::mutation_result;

use crate::db::{
    AccessLevel, AnalyticsEventRecord, AttendanceFilter, AttendanceRecord, AttendanceStatus,
    AuthorRecord, BlogPostRecord, BookCopyRecord, BookFilter, BookRecord, BookingFilter,
    BookingRecord, BookingStatus, CollectionRecord, CopyCondition, CopyStatus, CreateRoom,
    DailyStatsRecord, DepartmentRecord, EBookPermissionRecord, EBookRecord, EventRecord,
    EventRegistrationRecord, EventType, FacultyRecord, FineRecord, FineStatus, GenreRecord,
    ItemType, LoanFilter, LoanRecord, LoanRequestRecord, LoanRequestStatus, LoanStatus,
    MembershipType, NotificationCategory, NotificationRecord, PermissionRequestRecord,
    PermissionRequestStatus, PopularItemRecord, PostStatus, PublisherRecord, ReservationRecord,
    ReservationStatus, Role, RoomType, StudyRoomRecord, SystemHealthRecord, TopicRecord,
    UpdateRoom, UserFilter, UserRecord,
};
use crate::define_connection;
use crate::services::{self, SuggestionKind};

use super::auth::AuthExt;
use super::svc;

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Clone, SimpleObject)]
#[graphql(complex)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub membership_type: MembershipType,
    pub department: String,
    pub student_id: Option<String>,
    pub faculty_id: Option<String>,
    pub staff_id: Option<String>,
    pub phone: String,
    pub emergency_contact: String,
    pub role: Role,
    pub is_staff_approved: bool,
    pub email_verified: bool,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
}

#[ComplexObject]
impl User {
    /// Permission groups the user belongs to
    async fn groups(&self, ctx: &Context<'_>) -> Result<Vec<String>> {
        Ok(svc(ctx).accounts.groups(&self.id).await?)
    }
}

impl From<UserRecord> for User {
    fn from(r: UserRecord) -> Self {
        let full_name = r.full_name();
        Self {
            id: r.id,
            username: r.username,
            email: r.email,
            first_name: r.first_name,
            last_name: r.last_name,
            full_name,
            membership_type: r.membership_type,
            department: r.department,
            student_id: r.student_id,
            faculty_id: r.faculty_id,
            staff_id: r.staff_id,
            phone: r.phone,
            emergency_contact: r.emergency_contact,
            role: r.role,
            is_staff_approved: r.is_staff_approved,
            email_verified: r.email_verified,
            is_active: r.is_active,
            last_login_at: r.last_login_at,
            date_joined: r.date_joined,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct AuthPayload {
    pub user: User,
    /// Absent when the account still awaits activation
    pub token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<services::AuthPayload> for AuthPayload {
    fn from(p: services::AuthPayload) -> Self {
        Self {
            user: p.user.into(),
            expires_at: p.token.as_ref().map(|t| t.expires_at),
            token: p.token.map(|t| t.token),
        }
    }
}

#[derive(Debug, InputObject)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub membership_type: MembershipType,
    #[graphql(default)]
    pub department: String,
    pub student_id: Option<String>,
    pub faculty_id: Option<String>,
    pub staff_id: Option<String>,
    #[graphql(default)]
    pub phone: String,
}

impl From<RegisterInput> for services::RegisterInput {
    fn from(i: RegisterInput) -> Self {
        Self {
            username: i.username,
            email: i.email,
            password: i.password,
            first_name: i.first_name,
            last_name: i.last_name,
            membership_type: i.membership_type,
            department: i.department,
            student_id: i.student_id,
            faculty_id: i.faculty_id,
            staff_id: i.staff_id,
            phone: i.phone,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct UpdateProfileInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub emergency_contact: Option<String>,
    /// New password, at least 8 characters
    pub password: Option<String>,
}

impl From<UpdateProfileInput> for services::ProfilePatch {
    fn from(i: UpdateProfileInput) -> Self {
        Self {
            first_name: i.first_name,
            last_name: i.last_name,
            department: i.department,
            phone: i.phone,
            emergency_contact: i.emergency_contact,
            password: i.password,
        }
    }
}

#[derive(Debug, Default, InputObject)]
pub struct UserFilterInput {
    pub membership_type: Option<MembershipType>,
    pub is_active: Option<bool>,
    pub department: Option<String>,
}

impl From<UserFilterInput> for UserFilter {
    fn from(i: UserFilterInput) -> Self {
        Self {
            membership_type: i.membership_type,
            is_active: i.is_active,
            department: i.department,
        }
    }
}

// ============================================================================
// Study rooms
// ============================================================================

#[derive(Debug, Clone, SimpleObject)]
pub struct StudyRoom {
    pub id: String,
    pub name: String,
    pub room_type: RoomType,
    pub capacity: i64,
    pub features: String,
    pub location: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<StudyRoomRecord> for StudyRoom {
    fn from(r: StudyRoomRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            room_type: r.room_type,
            capacity: r.capacity,
            features: r.features,
            location: r.location,
            is_active: r.is_active,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(complex)]
pub struct Booking {
    pub id: String,
    pub room_id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_hours: f64,
    pub number_of_people: i64,
    pub purpose: String,
    pub status: BookingStatus,
    pub notes: String,
    pub decided_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[ComplexObject]
impl Booking {
    async fn room(&self, ctx: &Context<'_>) -> Result<StudyRoom> {
        Ok(svc(ctx).study_rooms.get_room(&self.room_id).await?.into())
    }
}

impl From<BookingRecord> for Booking {
    fn from(r: BookingRecord) -> Self {
        let duration_hours = r.duration_hours();
        Self {
            id: r.id,
            room_id: r.room_id,
            user_id: r.user_id,
            date: r.date,
            start_time: r.start_time,
            end_time: r.end_time,
            duration_hours,
            number_of_people: r.number_of_people,
            purpose: r.purpose,
            status: r.status,
            notes: r.notes,
            decided_by: r.decided_by,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct TimeSlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

#[derive(Debug, Clone, SimpleObject)]
pub struct RoomAvailability {
    pub room: StudyRoom,
    pub date: NaiveDate,
    /// Pending and confirmed bookings holding the room that day
    pub bookings: Vec<Booking>,
    pub free_slots: Vec<TimeSlot>,
}

impl From<services::RoomAvailability> for RoomAvailability {
    fn from(a: services::RoomAvailability) -> Self {
        Self {
            room: a.room.into(),
            date: a.date,
            bookings: a.bookings.into_iter().map(Into::into).collect(),
            free_slots: a
                .free_slots
                .into_iter()
                .map(|s| TimeSlot {
                    start: s.start,
                    end: s.end,
                })
                .collect(),
        }
    }
}

#[derive(Debug, InputObject)]
pub struct CreateRoomInput {
    pub name: String,
    pub room_type: RoomType,
    pub capacity: i64,
    #[graphql(default)]
    pub features: String,
    #[graphql(default)]
    pub location: String,
}

impl From<CreateRoomInput> for CreateRoom {
    fn from(i: CreateRoomInput) -> Self {
        Self {
            name: i.name,
            room_type: i.room_type,
            capacity: i.capacity,
            features: i.features,
            location: i.location,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct UpdateRoomInput {
    pub name: Option<String>,
    pub room_type: Option<RoomType>,
    pub capacity: Option<i64>,
    pub features: Option<String>,
    pub location: Option<String>,
}

impl From<UpdateRoomInput> for UpdateRoom {
    fn from(i: UpdateRoomInput) -> Self {
        Self {
            name: i.name,
            room_type: i.room_type,
            capacity: i.capacity,
            features: i.features,
            location: i.location,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct BookRoomInput {
    pub room_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub number_of_people: i64,
    #[graphql(default)]
    pub purpose: String,
}

impl From<BookRoomInput> for services::BookingRequest {
    fn from(i: BookRoomInput) -> Self {
        Self {
            room_id: i.room_id,
            date: i.date,
            start_time: i.start_time,
            end_time: i.end_time,
            number_of_people: i.number_of_people,
            purpose: i.purpose,
        }
    }
}

#[derive(Debug, Default, InputObject)]
pub struct BookingFilterInput {
    pub user_id: Option<String>,
    pub room_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub status: Option<BookingStatus>,
}

impl From<BookingFilterInput> for BookingFilter {
    fn from(i: BookingFilterInput) -> Self {
        Self {
            user_id: i.user_id,
            room_id: i.room_id,
            date: i.date,
            status: i.status,
        }
    }
}

// ============================================================================
// Catalogue
// ============================================================================

#[derive(Debug, Clone, SimpleObject)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub bio: String,
}

impl From<AuthorRecord> for Author {
    fn from(r: AuthorRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            bio: r.bio,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct Publisher {
    pub id: String,
    pub name: String,
    pub address: String,
    pub website: String,
}

impl From<PublisherRecord> for Publisher {
    fn from(r: PublisherRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            address: r.address,
            website: r.website,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct Faculty {
    pub id: String,
    pub name: String,
    pub code: String,
    pub description: String,
}

impl From<FacultyRecord> for Faculty {
    fn from(r: FacultyRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            code: r.code,
            description: r.description,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct Department {
    pub id: String,
    pub name: String,
    pub code: String,
    pub description: String,
    pub faculty_id: String,
}

impl From<DepartmentRecord> for Department {
    fn from(r: DepartmentRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            code: r.code,
            description: r.description,
            faculty_id: r.faculty_id,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub code: String,
    pub description: String,
    pub department_id: String,
}

impl From<TopicRecord> for Topic {
    fn from(r: TopicRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            code: r.code,
            description: r.description,
            department_id: r.department_id,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct Genre {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl From<GenreRecord> for Genre {
    fn from(r: GenreRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            description: r.description,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(complex)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub isbn: String,
    pub publisher_id: String,
    pub faculty_id: Option<String>,
    pub department_id: Option<String>,
    pub topic_id: Option<String>,
    pub genre_id: Option<String>,
    pub description: String,
    pub publication_date: NaiveDate,
    pub edition: String,
    pub pages: i64,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

#[ComplexObject]
impl Book {
    async fn authors(&self, ctx: &Context<'_>) -> Result<Vec<Author>> {
        let authors = svc(ctx).catalog.book_authors(&self.id).await?;
        Ok(authors.into_iter().map(Into::into).collect())
    }

    async fn publisher(&self, ctx: &Context<'_>) -> Result<Option<Publisher>> {
        let publisher = svc(ctx).catalog.get_publisher(&self.publisher_id).await?;
        Ok(publisher.map(Into::into))
    }

    async fn genre(&self, ctx: &Context<'_>) -> Result<Option<Genre>> {
        let Some(genre_id) = self.genre_id.as_deref() else {
            return Ok(None);
        };
        Ok(svc(ctx).catalog.get_genre(genre_id).await?.map(Into::into))
    }

    async fn availability(&self, ctx: &Context<'_>) -> Result<BookAvailability> {
        let a = svc(ctx).catalog.availability(&self.id).await?;
        Ok(BookAvailability {
            total_copies: a.total_copies,
            available_copies: a.available_copies,
            is_available: a.is_available,
        })
    }

    async fn copies(&self, ctx: &Context<'_>) -> Result<Vec<BookCopy>> {
        let copies = svc(ctx).catalog.copies_for_book(&self.id).await?;
        Ok(copies.into_iter().map(Into::into).collect())
    }
}

impl From<BookRecord> for Book {
    fn from(r: BookRecord) -> Self {
        Self {
            id: r.id,
            title: r.title,
            isbn: r.isbn,
            publisher_id: r.publisher_id,
            faculty_id: r.faculty_id,
            department_id: r.department_id,
            topic_id: r.topic_id,
            genre_id: r.genre_id,
            description: r.description,
            publication_date: r.publication_date,
            edition: r.edition,
            pages: r.pages,
            language: r.language,
            created_at: r.created_at,
        }
    }
}

define_connection!(BookConnection, BookEdge, Book);

#[derive(Debug, Clone, SimpleObject)]
pub struct BookAvailability {
    pub total_copies: i64,
    pub available_copies: i64,
    pub is_available: bool,
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(complex)]
pub struct BookCopy {
    pub id: String,
    pub book_id: String,
    pub barcode: String,
    pub condition: CopyCondition,
    pub status: CopyStatus,
    pub acquisition_date: NaiveDate,
    pub location: String,
}

#[ComplexObject]
impl BookCopy {
    async fn book(&self, ctx: &Context<'_>) -> Result<Book> {
        Ok(svc(ctx).catalog.get_book(&self.book_id).await?.into())
    }
}

impl From<BookCopyRecord> for BookCopy {
    fn from(r: BookCopyRecord) -> Self {
        Self {
            id: r.id,
            book_id: r.book_id,
            barcode: r.barcode,
            condition: r.condition,
            status: r.status,
            acquisition_date: r.acquisition_date,
            location: r.location,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct CreateBookInput {
    pub title: String,
    pub isbn: String,
    pub author_ids: Vec<String>,
    pub publisher_id: String,
    pub faculty_id: Option<String>,
    pub department_id: Option<String>,
    pub topic_id: Option<String>,
    pub genre_id: Option<String>,
    #[graphql(default)]
    pub description: String,
    pub publication_date: NaiveDate,
    #[graphql(default)]
    pub edition: String,
    #[graphql(default)]
    pub pages: i64,
    /// Defaults to English
    pub language: Option<String>,
}

impl From<CreateBookInput> for services::NewBook {
    fn from(i: CreateBookInput) -> Self {
        Self {
            title: i.title,
            isbn: i.isbn,
            author_ids: i.author_ids,
            publisher_id: i.publisher_id,
            faculty_id: i.faculty_id,
            department_id: i.department_id,
            topic_id: i.topic_id,
            genre_id: i.genre_id,
            description: i.description,
            publication_date: i.publication_date,
            edition: i.edition,
            pages: i.pages,
            language: i.language,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct CreateCopyInput {
    pub book_id: String,
    pub barcode: String,
    #[graphql(default_with = "CopyCondition::Good")]
    pub condition: CopyCondition,
    pub acquisition_date: Option<NaiveDate>,
    #[graphql(default)]
    pub location: String,
}

#[derive(Debug, Default, InputObject)]
pub struct BookFilterInput {
    /// Matched against title, ISBN, description and author names
    pub query: Option<String>,
    pub faculty_id: Option<String>,
    pub department_id: Option<String>,
    pub topic_id: Option<String>,
    pub genre_id: Option<String>,
    pub author_id: Option<String>,
    #[graphql(default)]
    pub available_only: bool,
}

impl From<BookFilterInput> for BookFilter {
    fn from(i: BookFilterInput) -> Self {
        Self {
            query: i.query,
            faculty_id: i.faculty_id,
            department_id: i.department_id,
            topic_id: i.topic_id,
            genre_id: i.genre_id,
            author_id: i.author_id,
            available_only: i.available_only,
        }
    }
}

// ============================================================================
// Circulation
// ============================================================================

#[derive(Debug, Clone, SimpleObject)]
#[graphql(complex)]
pub struct Loan {
    pub id: String,
    pub user_id: String,
    pub book_copy_id: String,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub renewal_count: i64,
}

#[ComplexObject]
impl Loan {
    async fn copy(&self, ctx: &Context<'_>) -> Result<BookCopy> {
        Ok(svc(ctx).catalog.get_copy(&self.book_copy_id).await?.into())
    }
}

impl From<LoanRecord> for Loan {
    fn from(r: LoanRecord) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            book_copy_id: r.book_copy_id,
            loan_date: r.loan_date,
            due_date: r.due_date,
            return_date: r.return_date,
            status: r.status,
            renewal_count: r.renewal_count,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct Fine {
    pub id: String,
    pub loan_id: String,
    /// Decimal amount with two places, e.g. "1.50"
    pub amount: String,
    pub reason: String,
    pub status: FineStatus,
    pub paid_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<FineRecord> for Fine {
    fn from(r: FineRecord) -> Self {
        Self {
            id: r.id,
            loan_id: r.loan_id,
            amount: r.amount,
            reason: r.reason,
            status: r.status,
            paid_date: r.paid_date,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct ReturnOutcome {
    pub loan: Loan,
    /// Overdue fine raised by this return
    pub fine: Option<Fine>,
}

impl From<services::ReturnOutcome> for ReturnOutcome {
    fn from(o: services::ReturnOutcome) -> Self {
        Self {
            loan: o.loan.into(),
            fine: o.fine.map(Into::into),
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(complex)]
pub struct Reservation {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    pub reservation_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub status: ReservationStatus,
}

#[ComplexObject]
impl Reservation {
    async fn book(&self, ctx: &Context<'_>) -> Result<Book> {
        Ok(svc(ctx).catalog.get_book(&self.book_id).await?.into())
    }
}

impl From<ReservationRecord> for Reservation {
    fn from(r: ReservationRecord) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            book_id: r.book_id,
            reservation_date: r.reservation_date,
            expiry_date: r.expiry_date,
            status: r.status,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(complex)]
pub struct LoanRequest {
    pub id: String,
    pub user_id: String,
    pub book_copy_id: String,
    pub request_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub status: LoanRequestStatus,
    pub approval_date: Option<DateTime<Utc>>,
    pub rejection_date: Option<DateTime<Utc>>,
    pub processed_by: Option<String>,
    pub notes: String,
    /// Loan created when the request was approved
    pub loan_id: Option<String>,
}

#[ComplexObject]
impl LoanRequest {
    async fn copy(&self, ctx: &Context<'_>) -> Result<BookCopy> {
        Ok(svc(ctx).catalog.get_copy(&self.book_copy_id).await?.into())
    }
}

impl From<LoanRequestRecord> for LoanRequest {
    fn from(r: LoanRequestRecord) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            book_copy_id: r.book_copy_id,
            request_date: r.request_date,
            expiry_date: r.expiry_date,
            status: r.status,
            approval_date: r.approval_date,
            rejection_date: r.rejection_date,
            processed_by: r.processed_by,
            notes: r.notes,
            loan_id: r.loan_id,
        }
    }
}

#[derive(Debug, Default, InputObject)]
pub struct LoanFilterInput {
    pub user_id: Option<String>,
    pub status: Option<LoanStatus>,
    pub book_copy_id: Option<String>,
}

impl From<LoanFilterInput> for LoanFilter {
    fn from(i: LoanFilterInput) -> Self {
        Self {
            user_id: i.user_id,
            status: i.status,
            book_copy_id: i.book_copy_id,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct Attendance {
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
    pub duration_minutes: Option<i64>,
    pub status: AttendanceStatus,
}

impl From<AttendanceRecord> for Attendance {
    fn from(r: AttendanceRecord) -> Self {
        let duration_minutes = r.duration_minutes();
        Self {
            id: r.id,
            user_id: r.user_id,
            registration_number: r.registration_number,
            full_name: r.full_name,
            department: r.department,
            faculty: r.faculty,
            phone: r.phone,
            purpose: r.purpose,
            check_in: r.check_in,
            check_out: r.check_out,
            duration_minutes,
            status: r.status,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct CheckInInput {
    pub registration_number: String,
    pub full_name: String,
    #[graphql(default)]
    pub department: String,
    #[graphql(default)]
    pub faculty: String,
    #[graphql(default)]
    pub phone: String,
    #[graphql(default)]
    pub purpose: String,
}

impl From<CheckInInput> for services::CheckInInput {
    fn from(i: CheckInInput) -> Self {
        Self {
            registration_number: i.registration_number,
            full_name: i.full_name,
            department: i.department,
            faculty: i.faculty,
            phone: i.phone,
            purpose: i.purpose,
        }
    }
}

#[derive(Debug, Default, InputObject)]
pub struct AttendanceFilterInput {
    pub user_id: Option<String>,
    pub status: Option<AttendanceStatus>,
    pub date: Option<NaiveDate>,
    /// Matched against name and registration number
    pub search: Option<String>,
}

impl From<AttendanceFilterInput> for AttendanceFilter {
    fn from(i: AttendanceFilterInput) -> Self {
        Self {
            user_id: i.user_id,
            status: i.status,
            date: i.date,
            search: i.search,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct PatronDashboard {
    pub open_loans: Vec<Loan>,
    /// Open loans due within three days
    pub due_soon: Vec<Loan>,
    pub active_reservations: Vec<Reservation>,
    pub pending_requests: Vec<LoanRequest>,
    pub unpaid_fines: Vec<Fine>,
    pub total_unpaid: String,
    pub can_borrow: bool,
}

fn convert_all<R, T: From<R>>(rows: Vec<R>) -> Vec<T> {
    rows.into_iter().map(Into::into).collect()
}

impl From<services::PatronDashboard> for PatronDashboard {
    fn from(d: services::PatronDashboard) -> Self {
        Self {
            open_loans: convert_all(d.open_loans),
            due_soon: convert_all(d.due_soon),
            active_reservations: convert_all(d.active_reservations),
            pending_requests: convert_all(d.pending_requests),
            unpaid_fines: convert_all(d.unpaid_fines),
            total_unpaid: d.total_unpaid,
            can_borrow: d.can_borrow,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct StaffDashboard {
    pub active_loans: i64,
    pub overdue_loans: i64,
    pub pending_requests: i64,
    pub active_visitors: i64,
    pub outstanding_fines: String,
    /// Oldest pending loan requests first
    pub request_queue: Vec<LoanRequest>,
}

impl From<services::StaffDashboard> for StaffDashboard {
    fn from(d: services::StaffDashboard) -> Self {
        Self {
            active_loans: d.active_loans,
            overdue_loans: d.overdue_loans,
            pending_requests: d.pending_requests,
            active_visitors: d.active_visitors,
            outstanding_fines: d.outstanding_fines,
            request_queue: convert_all(d.request_queue),
        }
    }
}

// ============================================================================
// Digital repository
// ============================================================================

#[derive(Debug, Clone, SimpleObject)]
pub struct Collection {
    pub id: String,
    pub name: String,
    pub description: String,
    pub curator_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CollectionRecord> for Collection {
    fn from(r: CollectionRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            description: r.description,
            curator_id: r.curator_id,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(complex)]
pub struct EBook {
    pub id: String,
    pub title: String,
    pub authors: String,
    #[graphql(name = "abstract")]
    pub abstract_text: String,
    pub access_level: AccessLevel,
    pub doi: Option<String>,
    pub collection_id: Option<String>,
    pub uploaded_by: String,
    pub upload_date: DateTime<Utc>,
    #[graphql(skip)]
    pub record: EBookRecord,
}

#[ComplexObject]
impl EBook {
    /// Whether the caller may download this eBook
    async fn can_access(&self, ctx: &Context<'_>) -> Result<bool> {
        Ok(svc(ctx)
            .repository
            .can_access(ctx.try_actor(), &self.record)
            .await?)
    }
}

impl From<EBookRecord> for EBook {
    fn from(r: EBookRecord) -> Self {
        Self {
            id: r.id.clone(),
            title: r.title.clone(),
            authors: r.authors.clone(),
            abstract_text: r.abstract_text.clone(),
            access_level: r.access_level,
            doi: r.doi.clone(),
            collection_id: r.collection_id.clone(),
            uploaded_by: r.uploaded_by.clone(),
            upload_date: r.upload_date,
            record: r,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct UploadEBookInput {
    pub title: String,
    #[graphql(default)]
    pub authors: String,
    #[graphql(name = "abstract", default)]
    pub abstract_text: String,
    /// Path of the stored file
    pub file_path: String,
    #[graphql(default_with = "AccessLevel::Open")]
    pub access_level: AccessLevel,
    pub doi: Option<String>,
    pub collection_id: Option<String>,
}

impl From<UploadEBookInput> for services::NewEBook {
    fn from(i: UploadEBookInput) -> Self {
        Self {
            title: i.title,
            authors: i.authors,
            abstract_text: i.abstract_text,
            file_path: i.file_path,
            access_level: i.access_level,
            doi: i.doi,
            collection_id: i.collection_id,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct EBookPermission {
    pub id: String,
    pub ebook_id: String,
    pub user_id: String,
    pub granted: bool,
    pub granted_by: Option<String>,
    pub granted_at: Option<DateTime<Utc>>,
}

impl From<EBookPermissionRecord> for EBookPermission {
    fn from(r: EBookPermissionRecord) -> Self {
        Self {
            id: r.id,
            ebook_id: r.ebook_id,
            user_id: r.user_id,
            granted: r.granted,
            granted_by: r.granted_by,
            granted_at: r.granted_at,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct PermissionRequest {
    pub id: String,
    pub ebook_id: String,
    pub user_id: String,
    pub reason: String,
    pub status: PermissionRequestStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: String,
    pub created_at: DateTime<Utc>,
}

impl From<PermissionRequestRecord> for PermissionRequest {
    fn from(r: PermissionRequestRecord) -> Self {
        Self {
            id: r.id,
            ebook_id: r.ebook_id,
            user_id: r.user_id,
            reason: r.reason,
            status: r.status,
            reviewed_by: r.reviewed_by,
            reviewed_at: r.reviewed_at,
            review_notes: r.review_notes,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct SearchResults {
    pub query: String,
    pub books: Vec<Book>,
    pub ebooks: Vec<EBook>,
    pub total: i64,
}

impl From<services::SearchResults> for SearchResults {
    fn from(r: services::SearchResults) -> Self {
        let total = r.total() as i64;
        Self {
            query: r.query,
            books: convert_all(r.books),
            ebooks: convert_all(r.ebooks),
            total,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct SearchSuggestion {
    pub text: String,
    pub kind: SuggestionKind,
}

impl From<services::SearchSuggestion> for SearchSuggestion {
    fn from(s: services::SearchSuggestion) -> Self {
        Self {
            text: s.text,
            kind: s.kind,
        }
    }
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Clone, SimpleObject)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub category: NotificationCategory,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<NotificationRecord> for Notification {
    fn from(r: NotificationRecord) -> Self {
        Self {
            id: r.id,
            title: r.title,
            message: r.message,
            category: r.category,
            read_at: r.read_at,
            created_at: r.created_at,
        }
    }
}

// ============================================================================
// Analytics
// ============================================================================

#[derive(Debug, Clone, SimpleObject)]
pub struct AnalyticsEvent {
    pub id: String,
    pub event_type: EventType,
    pub user_id: Option<String>,
    pub session_id: String,
    pub page_url: String,
    pub search_query: String,
    pub book_id: Option<String>,
    pub document_id: Option<String>,
    pub metadata: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<AnalyticsEventRecord> for AnalyticsEvent {
    fn from(r: AnalyticsEventRecord) -> Self {
        Self {
            id: r.id,
            event_type: r.event_type,
            user_id: r.user_id,
            session_id: r.session_id,
            page_url: r.page_url,
            search_query: r.search_query,
            book_id: r.book_id,
            document_id: r.document_id,
            metadata: Json(r.metadata.0),
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct TrackEventInput {
    pub event_type: EventType,
    #[graphql(default)]
    pub session_id: String,
    #[graphql(default)]
    pub page_url: String,
    #[graphql(default)]
    pub search_query: String,
    pub book_id: Option<String>,
    pub document_id: Option<String>,
    #[graphql(default)]
    pub referrer: String,
    pub metadata: Option<Json<serde_json::Value>>,
}

#[derive(Debug, Clone, SimpleObject)]
pub struct PopularItem {
    pub item_type: ItemType,
    pub item_id: String,
    pub view_count: i64,
    pub checkout_count: i64,
    pub search_count: i64,
    pub total_score: i64,
    pub last_updated: DateTime<Utc>,
}

impl From<PopularItemRecord> for PopularItem {
    fn from(r: PopularItemRecord) -> Self {
        Self {
            item_type: r.item_type,
            item_id: r.item_id,
            view_count: r.view_count,
            checkout_count: r.checkout_count,
            search_count: r.search_count,
            total_score: r.total_score,
            last_updated: r.last_updated,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct DailyStats {
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

impl From<DailyStatsRecord> for DailyStats {
    fn from(r: DailyStatsRecord) -> Self {
        Self {
            date: r.date,
            total_users: r.total_users,
            active_users: r.active_users,
            new_users: r.new_users,
            total_books: r.total_books,
            available_books: r.available_books,
            checked_out_books: r.checked_out_books,
            total_loans: r.total_loans,
            active_loans: r.active_loans,
            overdue_loans: r.overdue_loans,
            returned_today: r.returned_today,
            total_documents: r.total_documents,
            document_downloads: r.document_downloads,
            page_views: r.page_views,
            searches: r.searches,
            logins: r.logins,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct SystemHealth {
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

impl From<SystemHealthRecord> for SystemHealth {
    fn from(r: SystemHealthRecord) -> Self {
        Self {
            response_time: r.response_time,
            cpu_usage: r.cpu_usage,
            memory_usage: r.memory_usage,
            disk_usage: r.disk_usage,
            error_count: r.error_count,
            last_error: r.last_error,
            db_connections: r.db_connections,
            db_query_count: r.db_query_count,
            checked_at: r.checked_at,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct AnalyticsDashboard {
    pub days: i64,
    /// Live counts for today, not yet snapshotted
    pub today: DailyStats,
    pub daily_stats: Vec<DailyStats>,
    pub popular_books: Vec<PopularItem>,
    pub popular_documents: Vec<PopularItem>,
    pub recent_events: Vec<AnalyticsEvent>,
    pub latest_health: Option<SystemHealth>,
}

impl From<services::AnalyticsDashboard> for AnalyticsDashboard {
    fn from(d: services::AnalyticsDashboard) -> Self {
        Self {
            days: d.days,
            today: d.today.into(),
            daily_stats: convert_all(d.daily_stats),
            popular_books: convert_all(d.popular_books),
            popular_documents: convert_all(d.popular_documents),
            recent_events: convert_all(d.recent_events),
            latest_health: d.latest_health.map(Into::into),
        }
    }
}

// ============================================================================
// Blog and events
// ============================================================================

#[derive(Debug, Clone, SimpleObject)]
pub struct BlogPost {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author_id: String,
    pub status: PostStatus,
    pub published_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BlogPostRecord> for BlogPost {
    fn from(r: BlogPostRecord) -> Self {
        Self {
            id: r.id,
            title: r.title,
            content: r.content,
            author_id: r.author_id,
            status: r.status,
            published_date: r.published_date,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(complex)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub location: String,
    pub organizer_id: String,
    pub max_attendees: Option<i64>,
    pub registration_deadline: Option<DateTime<Utc>>,
    #[graphql(skip)]
    pub record: EventRecord,
}

#[ComplexObject]
impl Event {
    async fn registration_count(&self, ctx: &Context<'_>) -> Result<i64> {
        Ok(svc(ctx).content.registration_count(&self.id).await?)
    }

    /// Remaining places; null when the event has no cap
    async fn spots_left(&self, ctx: &Context<'_>) -> Result<Option<i64>> {
        Ok(svc(ctx).content.spots_left(&self.record).await?)
    }
}

impl From<EventRecord> for Event {
    fn from(r: EventRecord) -> Self {
        Self {
            id: r.id.clone(),
            title: r.title.clone(),
            description: r.description.clone(),
            date: r.date,
            time: r.time,
            location: r.location.clone(),
            organizer_id: r.organizer_id.clone(),
            max_attendees: r.max_attendees,
            registration_deadline: r.registration_deadline,
            record: r,
        }
    }
}

#[derive(Debug, InputObject)]
pub struct CreateEventInput {
    pub title: String,
    #[graphql(default)]
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[graphql(default)]
    pub location: String,
    pub max_attendees: Option<i64>,
    /// Registration stays closed without a deadline
    pub registration_deadline: Option<DateTime<Utc>>,
}

impl From<CreateEventInput> for services::NewEvent {
    fn from(i: CreateEventInput) -> Self {
        Self {
            title: i.title,
            description: i.description,
            date: i.date,
            time: i.time,
            location: i.location,
            max_attendees: i.max_attendees,
            registration_deadline: i.registration_deadline,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
pub struct EventRegistration {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<EventRegistrationRecord> for EventRegistration {
    fn from(r: EventRegistrationRecord) -> Self {
        Self {
            id: r.id,
            event_id: r.event_id,
            user_id: r.user_id,
            created_at: r.created_at,
        }
    }
}

// ============================================================================
// Mutation results
// ============================================================================

mutation_result!(MutationResult);
mutation_result!(CountResult, count: i64);
mutation_result!(AuthResult, payload: AuthPayload);
mutation_result!(UserResult, user: User);
mutation_result!(RoomResult, room: StudyRoom);
mutation_result!(BookingResult, booking: Booking);
mutation_result!(AuthorResult, author: Author);
mutation_result!(PublisherResult, publisher: Publisher);
mutation_result!(FacultyResult, faculty: Faculty);
mutation_result!(DepartmentResult, department: Department);
mutation_result!(TopicResult, topic: Topic);
mutation_result!(GenreResult, genre: Genre);
mutation_result!(BookResult, book: Book);
mutation_result!(CopyResult, copy: BookCopy);
mutation_result!(LoanResult, loan: Loan);
mutation_result!(ReturnResult, outcome: ReturnOutcome);
mutation_result!(ReservationResult, reservation: Reservation);
mutation_result!(FineResult, fine: Fine);
mutation_result!(LoanRequestResult, request: LoanRequest);
mutation_result!(AttendanceResult, attendance: Attendance);
mutation_result!(CollectionResult, collection: Collection);
mutation_result!(EBookResult, ebook: EBook);
mutation_result!(DownloadResult, file_path: String);
mutation_result!(PermissionRequestResult, request: PermissionRequest);
mutation_result!(PermissionResult, permission: EBookPermission);
mutation_result!(NotificationResult, notification: Notification);
mutation_result!(AnalyticsEventResult, event: AnalyticsEvent);
mutation_result!(PostResult, post: BlogPost);
mutation_result!(EventResult, event: Event);
mutation_result!(RegistrationResult, registration: EventRegistration);

/// Finish a mutation: a service failure becomes a failed result, not a
/// GraphQL error
pub fn finish<T, R, F>(result: services::ServiceResult<T>, ok: F) -> Result<R>
where
    R: From<services::ServiceError>,
    F: FnOnce(T) -> R,
{
    Ok(result.map(ok).unwrap_or_else(Into::into))
}
