use super::prelude::*;
use crate::db::PermissionRequestStatus;

#[derive(Default)]
pub struct RepositoryQueries;

#[Object]
impl RepositoryQueries {
    async fn collections(&self, ctx: &Context<'_>) -> Result<Vec<Collection>> {
        let rows = svc(ctx).repository.list_collections().await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// eBooks the caller can open; staff may ask for every eBook
    async fn ebooks(
        &self,
        ctx: &Context<'_>,
        search: Option<String>,
        #[graphql(default)] include_inaccessible: bool,
        #[graphql(default = 50)] limit: i64,
    ) -> Result<Vec<EBook>> {
        let rows = svc(ctx)
            .repository
            .list_ebooks(ctx.try_actor(), search.as_deref(), include_inaccessible, limit)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn ebook(&self, ctx: &Context<'_>, id: String) -> Result<EBook> {
        Ok(svc(ctx).repository.get_ebook(&id).await?.into())
    }

    async fn permission_requests(
        &self,
        ctx: &Context<'_>,
        user_id: Option<String>,
        status: Option<PermissionRequestStatus>,
    ) -> Result<Vec<PermissionRequest>> {
        let actor = ctx.actor()?;
        let rows = svc(ctx)
            .repository
            .list_permission_requests(actor, user_id, status)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[graphql(guard = "StaffGuard")]
    async fn ebook_permissions(
        &self,
        ctx: &Context<'_>,
        ebook_id: String,
    ) -> Result<Vec<EBookPermission>> {
        let actor = ctx.actor()?;
        let rows = svc(ctx).repository.list_permissions(actor, &ebook_id).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Books and accessible eBooks matching the query
    async fn search(
        &self,
        ctx: &Context<'_>,
        query: String,
        #[graphql(default = 20)] limit: i64,
    ) -> Result<SearchResults> {
        Ok(svc(ctx)
            .repository
            .global_search(ctx.try_actor(), &query, limit)
            .await?
            .into())
    }

    async fn search_suggestions(
        &self,
        ctx: &Context<'_>,
        query: String,
    ) -> Result<Vec<SearchSuggestion>> {
        let rows = svc(ctx)
            .repository
            .search_suggestions(ctx.try_actor(), &query)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
