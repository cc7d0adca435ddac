use super::prelude::*;
use crate::db::MembershipType;

#[derive(Default)]
pub struct AccountMutations;

#[Object]
impl AccountMutations {
    /// Create an account. Staff registrations wait for approval and get no token.
    async fn register(&self, ctx: &Context<'_>, input: RegisterInput) -> Result<AuthResult> {
        let result = svc(ctx).accounts.register(input.into()).await;
        finish(result, |payload| AuthResult::success(payload.into()))
    }

    async fn login(
        &self,
        ctx: &Context<'_>,
        username_or_email: String,
        password: String,
    ) -> Result<AuthResult> {
        let result = svc(ctx).accounts.login(&username_or_email, &password).await;
        finish(result, |payload| AuthResult::success(payload.into()))
    }

    /// Revoke the token this request was made with
    async fn logout(&self, ctx: &Context<'_>) -> Result<MutationResult> {
        let token = ctx.bearer()?;
        let result = svc(ctx).accounts.logout(token).await;
        finish(result, |_| MutationResult::success())
    }

    async fn update_profile(
        &self,
        ctx: &Context<'_>,
        input: UpdateProfileInput,
    ) -> Result<UserResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).accounts.update_profile(actor, input.into()).await;
        finish(result, |user| UserResult::success(user.into()))
    }

    async fn approve_staff(&self, ctx: &Context<'_>, user_id: String) -> Result<UserResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).accounts.approve_staff(actor, &user_id).await;
        finish(result, |user| UserResult::success(user.into()))
    }

    async fn verify_email(&self, ctx: &Context<'_>, user_id: String) -> Result<UserResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).accounts.verify_email(actor, &user_id).await;
        finish(result, |user| UserResult::success(user.into()))
    }

    async fn set_membership_type(
        &self,
        ctx: &Context<'_>,
        user_id: String,
        membership_type: MembershipType,
    ) -> Result<UserResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx)
            .accounts
            .set_membership_type(actor, &user_id, membership_type)
            .await;
        finish(result, |user| UserResult::success(user.into()))
    }

    async fn set_user_active(
        &self,
        ctx: &Context<'_>,
        user_id: String,
        is_active: bool,
    ) -> Result<UserResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).accounts.set_active(actor, &user_id, is_active).await;
        finish(result, |user| UserResult::success(user.into()))
    }
}
