use super::prelude::*;

#[derive(Default)]
pub struct NotificationMutations;

#[Object]
impl NotificationMutations {
    async fn mark_notification_read(
        &self,
        ctx: &Context<'_>,
        id: String,
    ) -> Result<NotificationResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).notifications.mark_read(actor, &id).await;
        finish(result, |n| NotificationResult::success(n.into()))
    }

    async fn mark_all_notifications_read(&self, ctx: &Context<'_>) -> Result<CountResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).notifications.mark_all_read(actor).await;
        finish(result, |n| CountResult::success(n as i64))
    }
}
