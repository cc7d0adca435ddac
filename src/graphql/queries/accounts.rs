use super::prelude::*;

#[derive(Default)]
pub struct AccountQueries;

#[Object]
impl AccountQueries {
    /// The signed-in user
    async fn me(&self, ctx: &Context<'_>) -> Result<User> {
        let actor = ctx.actor()?;
        Ok(svc(ctx).accounts.me(actor).await?.into())
    }

    #[graphql(guard = "StaffGuard")]
    async fn user(&self, ctx: &Context<'_>, id: String) -> Result<User> {
        Ok(svc(ctx).accounts.get_user(&id).await?.into())
    }

    /// Admin user listing
    async fn users(&self, ctx: &Context<'_>, filter: Option<UserFilterInput>) -> Result<Vec<User>> {
        let actor = ctx.actor()?;
        let users = svc(ctx)
            .accounts
            .list_users(actor, filter.unwrap_or_default().into())
            .await?;
        Ok(users.into_iter().map(Into::into).collect())
    }
}
