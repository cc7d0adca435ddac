//! Study rooms and their bookings

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use tracing::info;

use crate::config::CirculationPolicy;
use crate::db::sqlite_helpers::now_utc;
use crate::db::{
    BookingFilter, BookingRecord, BookingStatus, CreateBooking, CreateRoom, Database,
    NotificationCategory, StudyRoomRecord, UpdateRoom,
};

use super::notifications::Notifier;
use super::rules;
use super::{Actor, ServiceError, ServiceResult};

/// What a patron submits to book a room
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub room_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub number_of_people: i64,
    pub purpose: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Booked ranges and free gaps of one room on one day
#[derive(Debug, Clone, Serialize)]
pub struct RoomAvailability {
    pub room: StudyRoomRecord,
    pub date: NaiveDate,
    pub bookings: Vec<BookingRecord>,
    pub free_slots: Vec<TimeSlot>,
}

#[derive(Clone)]
pub struct StudyRoomService {
    db: Database,
    policy: CirculationPolicy,
    notifier: Arc<dyn Notifier>,
}

impl StudyRoomService {
    pub fn new(db: Database, policy: CirculationPolicy, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            policy,
            notifier,
        }
    }

    // ========================================================================
    // Rooms
    // ========================================================================

    pub async fn create_room(&self, actor: &Actor, mut room: CreateRoom) -> ServiceResult<StudyRoomRecord> {
        actor.require_staff()?;
        room.name = room.name.trim().to_string();
        if room.name.is_empty() {
            return Err(ServiceError::validation("Room name is required"));
        }
        validate_capacity(room.capacity)?;

        let repo = self.db.study_rooms();
        if repo.name_taken(&room.name, None).await? {
            return Err(ServiceError::conflict("A room with this name already exists"));
        }

        let room = repo.create_room(room).await?;
        info!(room_id = %room.id, name = %room.name, "Study room created");
        Ok(room)
    }

    pub async fn update_room(
        &self,
        actor: &Actor,
        id: &str,
        mut update: UpdateRoom,
    ) -> ServiceResult<StudyRoomRecord> {
        actor.require_staff()?;
        let repo = self.db.study_rooms();

        if let Some(capacity) = update.capacity {
            validate_capacity(capacity)?;
        }
        if let Some(name) = update.name.as_mut() {
            *name = name.trim().to_string();
            if name.is_empty() {
                return Err(ServiceError::validation("Room name is required"));
            }
            if repo.name_taken(name, Some(id)).await? {
                return Err(ServiceError::conflict("A room with this name already exists"));
            }
        }

        let room = repo
            .update_room(id, update)
            .await?
            .ok_or_else(|| ServiceError::not_found("Study room not found"))?;
        info!(room_id = %room.id, "Study room updated");
        Ok(room)
    }

    pub async fn set_room_active(&self, actor: &Actor, id: &str, is_active: bool) -> ServiceResult<StudyRoomRecord> {
        actor.require_staff()?;
        let repo = self.db.study_rooms();
        if !repo.set_room_active(id, is_active).await? {
            return Err(ServiceError::not_found("Study room not found"));
        }
        info!(room_id = %id, is_active, "Study room activation changed");
        self.get_room(id).await
    }

    pub async fn get_room(&self, id: &str) -> ServiceResult<StudyRoomRecord> {
        self.db
            .study_rooms()
            .get_room(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Study room not found"))
    }

    /// Active rooms; staff may include inactive ones
    pub async fn list_rooms(&self, actor: Option<&Actor>, include_inactive: bool) -> ServiceResult<Vec<StudyRoomRecord>> {
        let staff = actor.is_some_and(|a| a.is_staff);
        Ok(self
            .db
            .study_rooms()
            .list_rooms(!(include_inactive && staff))
            .await?)
    }

    // ========================================================================
    // Bookings
    // ========================================================================

    /// Book a room for the caller. The booking starts out pending.
    pub async fn book_room(&self, actor: &Actor, request: BookingRequest) -> ServiceResult<BookingRecord> {
        let room = self.get_room(&request.room_id).await?;
        if !room.is_active {
            return Err(ServiceError::invalid_state("This room is not available for booking"));
        }

        if request.start_time >= request.end_time {
            return Err(ServiceError::validation("End time must be after start time"));
        }
        let (open, close) =
            rules::opening_window(self.policy.room_opening_hour, self.policy.room_closing_hour);
        if request.start_time < open || request.end_time > close {
            return Err(ServiceError::validation(format!(
                "Bookings must be between {} and {}",
                open.format("%H:%M"),
                close.format("%H:%M")
            )));
        }
        if request.date < now_utc().date_naive() {
            return Err(ServiceError::validation("Cannot book a date in the past"));
        }
        if request.number_of_people < 1 || request.number_of_people > room.capacity {
            return Err(ServiceError::validation(format!(
                "Number of people must be between 1 and {}",
                room.capacity
            )));
        }

        let booking = self
            .db
            .study_rooms()
            .insert_booking_if_free(CreateBooking {
                room_id: room.id.clone(),
                user_id: actor.user_id.clone(),
                date: request.date,
                start_time: request.start_time,
                end_time: request.end_time,
                number_of_people: request.number_of_people,
                purpose: request.purpose.trim().to_string(),
            })
            .await?
            .ok_or_else(|| {
                ServiceError::conflict("The room is already booked for an overlapping time")
            })?;

        info!(booking_id = %booking.id, room_id = %room.id, user_id = %actor.user_id, "Room booked");
        Ok(booking)
    }

    pub async fn get_booking(&self, actor: &Actor, id: &str) -> ServiceResult<BookingRecord> {
        let booking = self.load_booking(id).await?;
        actor.require_owner_or_staff(&booking.user_id)?;
        Ok(booking)
    }

    /// Bookings matching the filter; patrons only ever see their own
    pub async fn list_bookings(&self, actor: &Actor, mut filter: BookingFilter) -> ServiceResult<Vec<BookingRecord>> {
        filter.user_id = actor.visible_owner(filter.user_id);
        Ok(self.db.study_rooms().list_bookings(&filter).await?)
    }

    pub async fn confirm_booking(&self, actor: &Actor, id: &str) -> ServiceResult<BookingRecord> {
        actor.require_staff()?;
        let booking = self
            .transition(actor, id, &[BookingStatus::Pending], BookingStatus::Confirmed, None)
            .await?;
        self.notify_decision(&booking, "Booking confirmed", "has been confirmed")
            .await;
        Ok(booking)
    }

    pub async fn reject_booking(&self, actor: &Actor, id: &str, reason: &str) -> ServiceResult<BookingRecord> {
        actor.require_staff()?;
        let booking = self
            .transition(
                actor,
                id,
                &[BookingStatus::Pending],
                BookingStatus::Rejected,
                Some(reason.trim()),
            )
            .await?;
        self.notify_decision(&booking, "Booking rejected", "was rejected").await;
        Ok(booking)
    }

    pub async fn cancel_booking(&self, actor: &Actor, id: &str) -> ServiceResult<BookingRecord> {
        let booking = self.load_booking(id).await?;
        actor.require_owner_or_staff(&booking.user_id)?;
        self.transition(actor, id, &BookingStatus::HOLDING, BookingStatus::Cancelled, None)
            .await
    }

    pub async fn complete_booking(&self, actor: &Actor, id: &str) -> ServiceResult<BookingRecord> {
        actor.require_staff()?;
        self.transition(actor, id, &[BookingStatus::Confirmed], BookingStatus::Completed, None)
            .await
    }

    /// Booked ranges plus free gaps for a room on a date
    pub async fn availability(&self, room_id: &str, date: NaiveDate) -> ServiceResult<RoomAvailability> {
        let room = self.get_room(room_id).await?;
        let bookings = self.db.study_rooms().holding_bookings(room_id, date).await?;

        let (open, close) =
            rules::opening_window(self.policy.room_opening_hour, self.policy.room_closing_hour);
        let booked: Vec<(NaiveTime, NaiveTime)> =
            bookings.iter().map(|b| (b.start_time, b.end_time)).collect();
        let free_slots = rules::free_slots(open, close, &booked)
            .into_iter()
            .map(|(start, end)| TimeSlot { start, end })
            .collect();

        Ok(RoomAvailability {
            room,
            date,
            bookings,
            free_slots,
        })
    }

    async fn load_booking(&self, id: &str) -> ServiceResult<BookingRecord> {
        self.db
            .study_rooms()
            .get_booking(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Booking not found"))
    }

    async fn transition(
        &self,
        actor: &Actor,
        id: &str,
        from: &[BookingStatus],
        to: BookingStatus,
        notes: Option<&str>,
    ) -> ServiceResult<BookingRecord> {
        let repo = self.db.study_rooms();
        let current = self.load_booking(id).await?;

        let decided_by = actor.is_staff.then_some(actor.user_id.as_str());
        if !repo.transition_booking(id, from, to, decided_by, notes).await? {
            return Err(ServiceError::invalid_state(format!(
                "Booking is {} and cannot become {}",
                current.status.as_str(),
                to.as_str()
            )));
        }

        info!(booking_id = %id, from = current.status.as_str(), to = to.as_str(), "Booking status changed");
        self.load_booking(id).await
    }

    async fn notify_decision(&self, booking: &BookingRecord, title: &str, outcome: &str) {
        let message = format!(
            "Your booking on {} from {} to {} {}.",
            booking.date,
            booking.start_time.format("%H:%M"),
            booking.end_time.format("%H:%M"),
            outcome
        );
        self.notifier
            .notify(&booking.user_id, NotificationCategory::Booking, title, &message)
            .await;
    }
}

fn validate_capacity(capacity: i64) -> ServiceResult<()> {
    if capacity < 1 {
        return Err(ServiceError::validation("Capacity must be at least 1"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MembershipType, RoomType};
    use crate::services::test_support::{member_actor, staff_actor, test_db, test_services};
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn tomorrow() -> NaiveDate {
        Utc::now().date_naive() + Duration::days(1)
    }

    fn request(room_id: &str, start: NaiveTime, end: NaiveTime) -> BookingRequest {
        BookingRequest {
            room_id: room_id.to_string(),
            date: tomorrow(),
            start_time: start,
            end_time: end,
            number_of_people: 2,
            purpose: "Group study".into(),
        }
    }

    async fn setup() -> (StudyRoomService, Actor, Actor, StudyRoomRecord) {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Student).await;
        let room = services
            .study_rooms
            .create_room(
                &staff,
                CreateRoom {
                    name: "Room A".into(),
                    room_type: RoomType::Group,
                    capacity: 4,
                    features: "Whiteboard".into(),
                    location: "Level 2".into(),
                },
            )
            .await
            .unwrap();
        (services.study_rooms, staff, patron, room)
    }

    #[tokio::test]
    async fn test_overlapping_booking_rejected_adjacent_allowed() {
        let (rooms, _staff, patron, room) = setup().await;

        rooms.book_room(&patron, request(&room.id, t(9, 0), t(10, 0))).await.unwrap();
        assert_matches!(
            rooms.book_room(&patron, request(&room.id, t(9, 30), t(10, 30))).await,
            Err(ServiceError::Conflict(_))
        );
        rooms.book_room(&patron, request(&room.id, t(10, 0), t(11, 0))).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_booking_frees_the_slot() {
        let (rooms, _staff, patron, room) = setup().await;

        let booking = rooms.book_room(&patron, request(&room.id, t(13, 0), t(14, 0))).await.unwrap();
        rooms.cancel_booking(&patron, &booking.id).await.unwrap();
        rooms.book_room(&patron, request(&room.id, t(13, 0), t(14, 0))).await.unwrap();
    }

    #[tokio::test]
    async fn test_booking_validation() {
        let (rooms, _staff, patron, room) = setup().await;

        assert_matches!(
            rooms.book_room(&patron, request(&room.id, t(11, 0), t(10, 0))).await,
            Err(ServiceError::Validation(_))
        );
        assert_matches!(
            rooms.book_room(&patron, request(&room.id, t(6, 0), t(9, 0))).await,
            Err(ServiceError::Validation(_))
        );

        let mut crowded = request(&room.id, t(9, 0), t(10, 0));
        crowded.number_of_people = 5;
        assert_matches!(
            rooms.book_room(&patron, crowded).await,
            Err(ServiceError::Validation(_))
        );

        let mut past = request(&room.id, t(9, 0), t(10, 0));
        past.date = Utc::now().date_naive() - Duration::days(1);
        assert_matches!(
            rooms.book_room(&patron, past).await,
            Err(ServiceError::Validation(_))
        );
    }

    #[tokio::test]
    async fn test_decisions_follow_state_machine() {
        let (rooms, staff, patron, room) = setup().await;
        let booking = rooms.book_room(&patron, request(&room.id, t(9, 0), t(10, 0))).await.unwrap();

        assert_matches!(
            rooms.confirm_booking(&patron, &booking.id).await,
            Err(ServiceError::Forbidden(_))
        );
        assert_matches!(
            rooms.complete_booking(&staff, &booking.id).await,
            Err(ServiceError::InvalidState(_))
        );

        let confirmed = rooms.confirm_booking(&staff, &booking.id).await.unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.decided_by.as_deref(), Some(staff.user_id.as_str()));

        assert_matches!(
            rooms.reject_booking(&staff, &booking.id, "late").await,
            Err(ServiceError::InvalidState(_))
        );
        let done = rooms.complete_booking(&staff, &booking.id).await.unwrap();
        assert_eq!(done.status, BookingStatus::Completed);
    }

    #[tokio::test]
    async fn test_patrons_only_see_their_bookings() {
        let (rooms, staff, patron, room) = setup().await;
        rooms.book_room(&patron, request(&room.id, t(9, 0), t(10, 0))).await.unwrap();
        rooms.book_room(&staff, request(&room.id, t(12, 0), t(13, 0))).await.unwrap();

        let mine = rooms.list_bookings(&patron, BookingFilter::default()).await.unwrap();
        assert_eq!(mine.len(), 1);
        let all = rooms.list_bookings(&staff, BookingFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_availability_lists_free_gaps() {
        let (rooms, _staff, patron, room) = setup().await;
        rooms.book_room(&patron, request(&room.id, t(9, 0), t(10, 0))).await.unwrap();

        let availability = rooms.availability(&room.id, tomorrow()).await.unwrap();
        assert_eq!(availability.bookings.len(), 1);
        assert_eq!(
            availability.free_slots,
            vec![
                TimeSlot { start: t(8, 0), end: t(9, 0) },
                TimeSlot { start: t(10, 0), end: t(22, 0) },
            ]
        );
    }

    #[tokio::test]
    async fn test_room_names_are_unique() {
        let (rooms, staff, _patron, _room) = setup().await;
        let dup = rooms
            .create_room(
                &staff,
                CreateRoom {
                    name: "Room A".into(),
                    room_type: RoomType::Individual,
                    capacity: 1,
                    features: String::new(),
                    location: String::new(),
                },
            )
            .await;
        assert_matches!(dup, Err(ServiceError::Conflict(_)));
    }
}
