use super::prelude::*;

#[derive(Default)]
pub struct StudyRoomMutations;

#[Object]
impl StudyRoomMutations {
    async fn create_study_room(&self, ctx: &Context<'_>, input: CreateRoomInput) -> Result<RoomResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).study_rooms.create_room(actor, input.into()).await;
        finish(result, |room| RoomResult::success(room.into()))
    }

    async fn update_study_room(
        &self,
        ctx: &Context<'_>,
        id: String,
        input: UpdateRoomInput,
    ) -> Result<RoomResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).study_rooms.update_room(actor, &id, input.into()).await;
        finish(result, |room| RoomResult::success(room.into()))
    }

    async fn set_study_room_active(
        &self,
        ctx: &Context<'_>,
        id: String,
        is_active: bool,
    ) -> Result<RoomResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).study_rooms.set_room_active(actor, &id, is_active).await;
        finish(result, |room| RoomResult::success(room.into()))
    }

    /// Request a slot; the booking starts out pending
    async fn book_study_room(&self, ctx: &Context<'_>, input: BookRoomInput) -> Result<BookingResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).study_rooms.book_room(actor, input.into()).await;
        finish(result, |booking| BookingResult::success(booking.into()))
    }

    async fn confirm_booking(&self, ctx: &Context<'_>, id: String) -> Result<BookingResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).study_rooms.confirm_booking(actor, &id).await;
        finish(result, |booking| BookingResult::success(booking.into()))
    }

    async fn reject_booking(
        &self,
        ctx: &Context<'_>,
        id: String,
        #[graphql(default)] reason: String,
    ) -> Result<BookingResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).study_rooms.reject_booking(actor, &id, &reason).await;
        finish(result, |booking| BookingResult::success(booking.into()))
    }

    async fn cancel_booking(&self, ctx: &Context<'_>, id: String) -> Result<BookingResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).study_rooms.cancel_booking(actor, &id).await;
        finish(result, |booking| BookingResult::success(booking.into()))
    }

    async fn complete_booking(&self, ctx: &Context<'_>, id: String) -> Result<BookingResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).study_rooms.complete_booking(actor, &id).await;
        finish(result, |booking| BookingResult::success(booking.into()))
    }
}
