use super::prelude::*;

#[derive(Default)]
pub struct ContentMutations;

#[Object]
impl ContentMutations {
    /// Draft a new post
    async fn create_blog_post(
        &self,
        ctx: &Context<'_>,
        title: String,
        #[graphql(default)] content: String,
    ) -> Result<PostResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).content.create_post(actor, &title, &content).await;
        finish(result, |p| PostResult::success(p.into()))
    }

    async fn update_blog_post(
        &self,
        ctx: &Context<'_>,
        id: String,
        title: Option<String>,
        content: Option<String>,
    ) -> Result<PostResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx)
            .content
            .update_post(actor, &id, title.as_deref(), content.as_deref())
            .await;
        finish(result, |p| PostResult::success(p.into()))
    }

    async fn publish_blog_post(&self, ctx: &Context<'_>, id: String) -> Result<PostResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).content.publish_post(actor, &id).await;
        finish(result, |p| PostResult::success(p.into()))
    }

    async fn unpublish_blog_post(&self, ctx: &Context<'_>, id: String) -> Result<PostResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).content.unpublish_post(actor, &id).await;
        finish(result, |p| PostResult::success(p.into()))
    }

    async fn create_event(&self, ctx: &Context<'_>, input: CreateEventInput) -> Result<EventResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).content.create_event(actor, input.into()).await;
        finish(result, |e| EventResult::success(e.into()))
    }

    async fn register_for_event(
        &self,
        ctx: &Context<'_>,
        event_id: String,
    ) -> Result<RegistrationResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).content.register_for_event(actor, &event_id).await;
        finish(result, |r| RegistrationResult::success(r.into()))
    }

    async fn unregister_from_event(&self, ctx: &Context<'_>, event_id: String) -> Result<MutationResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).content.unregister(actor, &event_id).await;
        finish(result, |_| MutationResult::success())
    }
}
