use chrono::NaiveDate;

use super::prelude::*;

#[derive(Default)]
pub struct StudyRoomQueries;

#[Object]
impl StudyRoomQueries {
    /// Bookable rooms. Inactive rooms are only listed for staff.
    async fn study_rooms(
        &self,
        ctx: &Context<'_>,
        #[graphql(default)] include_inactive: bool,
    ) -> Result<Vec<StudyRoom>> {
        let rooms = svc(ctx)
            .study_rooms
            .list_rooms(ctx.try_actor(), include_inactive)
            .await?;
        Ok(rooms.into_iter().map(Into::into).collect())
    }

    async fn study_room(&self, ctx: &Context<'_>, id: String) -> Result<StudyRoom> {
        Ok(svc(ctx).study_rooms.get_room(&id).await?.into())
    }

    /// Holding bookings and free slots for a room on one day
    async fn room_availability(
        &self,
        ctx: &Context<'_>,
        room_id: String,
        date: NaiveDate,
    ) -> Result<RoomAvailability> {
        Ok(svc(ctx).study_rooms.availability(&room_id, date).await?.into())
    }

    #[graphql(guard = "AuthGuard")]
    async fn bookings(
        &self,
        ctx: &Context<'_>,
        filter: Option<BookingFilterInput>,
    ) -> Result<Vec<Booking>> {
        let actor = ctx.actor()?;
        let bookings = svc(ctx)
            .study_rooms
            .list_bookings(actor, filter.unwrap_or_default().into())
            .await?;
        Ok(bookings.into_iter().map(Into::into).collect())
    }

    async fn booking(&self, ctx: &Context<'_>, id: String) -> Result<Booking> {
        let actor = ctx.actor()?;
        Ok(svc(ctx).study_rooms.get_booking(actor, &id).await?.into())
    }
}
