//! Schema assembly

use async_graphql::{EmptySubscription, MergedObject, Schema};

use crate::services::Services;

use super::mutations::*;
use super::queries::*;

pub type StacksSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

#[derive(MergedObject, Default)]
pub struct QueryRoot(
    AccountQueries,
    StudyRoomQueries,
    CatalogQueries,
    CirculationQueries,
    RepositoryQueries,
    NotificationQueries,
    AnalyticsQueries,
    ContentQueries,
);

#[derive(MergedObject, Default)]
pub struct MutationRoot(
    AccountMutations,
    StudyRoomMutations,
    CatalogMutations,
    CirculationMutations,
    RepositoryMutations,
    NotificationMutations,
    AnalyticsMutations,
    ContentMutations,
);

/// Build the schema; the caller's [crate::services::Actor] is attached per request
pub fn build_schema(services: Services) -> StacksSchema {
    Schema::build(QueryRoot::default(), MutationRoot::default(), EmptySubscription)
        .data(services)
        .finish()
}
