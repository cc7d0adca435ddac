use super::prelude::*;
use crate::db::AccessLevel;

#[derive(Default)]
pub struct RepositoryMutations;

#[Object]
impl RepositoryMutations {
    async fn create_collection(
        &self,
        ctx: &Context<'_>,
        name: String,
        #[graphql(default)] description: String,
    ) -> Result<CollectionResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx)
            .repository
            .create_collection(actor, &name, &description)
            .await;
        finish(result, |c| CollectionResult::success(c.into()))
    }

    async fn upload_ebook(&self, ctx: &Context<'_>, input: UploadEBookInput) -> Result<EBookResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).repository.upload_ebook(actor, input.into()).await;
        finish(result, |e| EBookResult::success(e.into()))
    }

    async fn update_ebook_access(
        &self,
        ctx: &Context<'_>,
        id: String,
        access_level: AccessLevel,
    ) -> Result<EBookResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx)
            .repository
            .update_access_level(actor, &id, access_level)
            .await;
        finish(result, |e| EBookResult::success(e.into()))
    }

    /// Resolve the stored file of an eBook the caller may open
    async fn download_ebook(&self, ctx: &Context<'_>, id: String) -> Result<DownloadResult> {
        let result = svc(ctx).repository.download(ctx.try_actor(), &id).await;
        finish(result, DownloadResult::success)
    }

    async fn request_ebook_permission(
        &self,
        ctx: &Context<'_>,
        ebook_id: String,
        #[graphql(default)] reason: String,
    ) -> Result<PermissionRequestResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx)
            .repository
            .request_permission(actor, &ebook_id, &reason)
            .await;
        finish(result, |r| PermissionRequestResult::success(r.into()))
    }

    async fn approve_permission_request(
        &self,
        ctx: &Context<'_>,
        id: String,
        #[graphql(default)] notes: String,
    ) -> Result<PermissionRequestResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).repository.approve_request(actor, &id, &notes).await;
        finish(result, |r| PermissionRequestResult::success(r.into()))
    }

    async fn reject_permission_request(
        &self,
        ctx: &Context<'_>,
        id: String,
        #[graphql(default)] notes: String,
    ) -> Result<PermissionRequestResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).repository.reject_request(actor, &id, &notes).await;
        finish(result, |r| PermissionRequestResult::success(r.into()))
    }

    async fn cancel_permission_request(
        &self,
        ctx: &Context<'_>,
        id: String,
    ) -> Result<PermissionRequestResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).repository.cancel_request(actor, &id).await;
        finish(result, |r| PermissionRequestResult::success(r.into()))
    }

    async fn grant_ebook_permission(
        &self,
        ctx: &Context<'_>,
        ebook_id: String,
        user_id: String,
    ) -> Result<PermissionResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx)
            .repository
            .grant_permission(actor, &ebook_id, &user_id)
            .await;
        finish(result, |p| PermissionResult::success(p.into()))
    }

    async fn revoke_ebook_permission(
        &self,
        ctx: &Context<'_>,
        ebook_id: String,
        user_id: String,
    ) -> Result<MutationResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx)
            .repository
            .revoke_permission(actor, &ebook_id, &user_id)
            .await;
        finish(result, |_| MutationResult::success())
    }
}
