use chrono::Utc;

use super::prelude::*;

#[derive(Default)]
pub struct ContentQueries;

#[Object]
impl ContentQueries {
    /// Published posts; staff also see drafts
    async fn blog_posts(&self, ctx: &Context<'_>) -> Result<Vec<BlogPost>> {
        let rows = svc(ctx).content.list_posts(ctx.try_actor()).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn blog_post(&self, ctx: &Context<'_>, id: String) -> Result<BlogPost> {
        Ok(svc(ctx).content.get_post(ctx.try_actor(), &id).await?.into())
    }

    /// Events from today onwards
    async fn upcoming_events(&self, ctx: &Context<'_>) -> Result<Vec<Event>> {
        let today = Utc::now().date_naive();
        let rows = svc(ctx).content.list_upcoming(today).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn event(&self, ctx: &Context<'_>, id: String) -> Result<Event> {
        Ok(svc(ctx).content.get_event(&id).await?.into())
    }

    async fn my_event_registrations(&self, ctx: &Context<'_>) -> Result<Vec<EventRegistration>> {
        let actor = ctx.actor()?;
        let rows = svc(ctx).content.my_registrations(actor).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
