use chrono::Utc;

use super::prelude::*;
use crate::db::{CopyCondition, CopyStatus, CreateBookCopy};

#[derive(Default)]
pub struct CatalogMutations;

#[Object]
impl CatalogMutations {
    async fn create_author(
        &self,
        ctx: &Context<'_>,
        name: String,
        #[graphql(default)] bio: String,
    ) -> Result<AuthorResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).catalog.create_author(actor, &name, &bio).await;
        finish(result, |author| AuthorResult::success(author.into()))
    }

    async fn create_publisher(
        &self,
        ctx: &Context<'_>,
        name: String,
        #[graphql(default)] address: String,
        #[graphql(default)] website: String,
    ) -> Result<PublisherResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx)
            .catalog
            .create_publisher(actor, &name, &address, &website)
            .await;
        finish(result, |publisher| PublisherResult::success(publisher.into()))
    }

    async fn create_faculty(
        &self,
        ctx: &Context<'_>,
        name: String,
        code: String,
        #[graphql(default)] description: String,
    ) -> Result<FacultyResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx)
            .catalog
            .create_faculty(actor, &name, &code, &description)
            .await;
        finish(result, |faculty| FacultyResult::success(faculty.into()))
    }

    async fn create_department(
        &self,
        ctx: &Context<'_>,
        name: String,
        code: String,
        #[graphql(default)] description: String,
        faculty_id: String,
    ) -> Result<DepartmentResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx)
            .catalog
            .create_department(actor, &name, &code, &description, &faculty_id)
            .await;
        finish(result, |department| DepartmentResult::success(department.into()))
    }

    async fn create_topic(
        &self,
        ctx: &Context<'_>,
        name: String,
        code: String,
        #[graphql(default)] description: String,
        department_id: String,
    ) -> Result<TopicResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx)
            .catalog
            .create_topic(actor, &name, &code, &description, &department_id)
            .await;
        finish(result, |topic| TopicResult::success(topic.into()))
    }

    async fn create_genre(
        &self,
        ctx: &Context<'_>,
        name: String,
        #[graphql(default)] description: String,
    ) -> Result<GenreResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).catalog.create_genre(actor, &name, &description).await;
        finish(result, |genre| GenreResult::success(genre.into()))
    }

    async fn create_book(&self, ctx: &Context<'_>, input: CreateBookInput) -> Result<BookResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).catalog.create_book(actor, input.into()).await;
        finish(result, |book| BookResult::success(book.into()))
    }

    async fn create_book_copy(&self, ctx: &Context<'_>, input: CreateCopyInput) -> Result<CopyResult> {
        let actor = ctx.actor()?;
        let copy = CreateBookCopy {
            book_id: input.book_id,
            barcode: input.barcode,
            condition: input.condition,
            acquisition_date: input
                .acquisition_date
                .unwrap_or_else(|| Utc::now().date_naive()),
            location: input.location,
        };
        let result = svc(ctx).catalog.create_copy(actor, copy).await;
        finish(result, |copy| CopyResult::success(copy.into()))
    }

    /// Mark a copy available, lost or damaged; checkouts move copies themselves
    async fn set_copy_status(
        &self,
        ctx: &Context<'_>,
        copy_id: String,
        status: CopyStatus,
    ) -> Result<CopyResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx).catalog.set_copy_status(actor, &copy_id, status).await;
        finish(result, |copy| CopyResult::success(copy.into()))
    }

    async fn set_copy_condition(
        &self,
        ctx: &Context<'_>,
        copy_id: String,
        condition: CopyCondition,
    ) -> Result<CopyResult> {
        let actor = ctx.actor()?;
        let result = svc(ctx)
            .catalog
            .set_copy_condition(actor, &copy_id, condition)
            .await;
        finish(result, |copy| CopyResult::success(copy.into()))
    }
}
