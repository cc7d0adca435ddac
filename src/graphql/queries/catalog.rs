use super::prelude::*;
use crate::graphql::pagination::{Page, page_args};

#[derive(Default)]
pub struct CatalogQueries;

#[Object]
impl CatalogQueries {
    /// Search the catalogue with cursor pagination
    async fn books(
        &self,
        ctx: &Context<'_>,
        filter: Option<BookFilterInput>,
        first: Option<i32>,
        after: Option<String>,
    ) -> Result<BookConnection> {
        let (offset, limit) = page_args(first, after.as_deref())?;
        let filter = filter.unwrap_or_default().into();
        let (books, total) = svc(ctx).catalog.search_books(&filter, limit, offset).await?;
        Ok(BookConnection::from_page(Page::new(books, offset, total)))
    }

    /// Book detail; counts as a view
    async fn book(&self, ctx: &Context<'_>, id: String) -> Result<Book> {
        Ok(svc(ctx).catalog.view_book(ctx.try_actor(), &id).await?.into())
    }

    async fn book_copy(&self, ctx: &Context<'_>, id: String) -> Result<BookCopy> {
        Ok(svc(ctx).catalog.get_copy(&id).await?.into())
    }

    async fn authors(&self, ctx: &Context<'_>) -> Result<Vec<Author>> {
        let rows = svc(ctx).catalog.list_authors().await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn publishers(&self, ctx: &Context<'_>) -> Result<Vec<Publisher>> {
        let rows = svc(ctx).catalog.list_publishers().await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn faculties(&self, ctx: &Context<'_>) -> Result<Vec<Faculty>> {
        let rows = svc(ctx).catalog.list_faculties().await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn departments(
        &self,
        ctx: &Context<'_>,
        faculty_id: Option<String>,
    ) -> Result<Vec<Department>> {
        let rows = svc(ctx).catalog.list_departments(faculty_id.as_deref()).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn topics(&self, ctx: &Context<'_>, department_id: Option<String>) -> Result<Vec<Topic>> {
        let rows = svc(ctx).catalog.list_topics(department_id.as_deref()).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn genres(&self, ctx: &Context<'_>) -> Result<Vec<Genre>> {
        let rows = svc(ctx).catalog.list_genres().await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
