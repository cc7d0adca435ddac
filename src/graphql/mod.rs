//! GraphQL API
//!
//! The single API surface for circulation, rooms, the digital repository and
//! content. Each domain contributes a query and a mutation object under
//! `queries/` and `mutations/`; `schema.rs` merges them into the roots.
//!
//! Read operations fail with a GraphQL error carrying a `code` extension.
//! Mutations report domain failures in their result payload instead
//! (`success`, `error`, `code`), and only raise for missing authentication.

use async_graphql::Context;

use crate::services::Services;

pub mod auth;
pub mod mutations;
pub mod pagination;
pub mod queries;
mod schema;
pub mod types;

pub use auth::{AuthExt, BearerToken, ClientInfo, bearer_token};
pub use schema::{StacksSchema, build_schema};

pub(crate) fn svc<'a>(ctx: &Context<'a>) -> &'a Services {
    ctx.data_unchecked::<Services>()
}
