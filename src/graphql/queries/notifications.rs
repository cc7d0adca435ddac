use super::prelude::*;

#[derive(Default)]
pub struct NotificationQueries;

#[Object]
impl NotificationQueries {
    /// The caller's notifications, newest first
    async fn notifications(
        &self,
        ctx: &Context<'_>,
        #[graphql(default)] unread_only: bool,
        #[graphql(default = 50)] limit: i64,
    ) -> Result<Vec<Notification>> {
        let actor = ctx.actor()?;
        let rows = svc(ctx)
            .notifications
            .my_notifications(actor, unread_only, limit)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn unread_notification_count(&self, ctx: &Context<'_>) -> Result<i64> {
        let actor = ctx.actor()?;
        Ok(svc(ctx).notifications.unread_count(actor).await?)
    }
}
