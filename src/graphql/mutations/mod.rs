pub mod accounts;
pub mod analytics;
pub mod catalog;
pub mod circulation;
pub mod content;
pub mod notifications;
pub mod repository;
pub mod study_rooms;

pub use accounts::AccountMutations;
pub use analytics::AnalyticsMutations;
pub use catalog::CatalogMutations;
pub use circulation::CirculationMutations;
pub use content::ContentMutations;
pub use notifications::NotificationMutations;
pub use repository::RepositoryMutations;
pub use study_rooms::StudyRoomMutations;

pub(crate) mod prelude {
    pub(crate) use async_graphql::{Context, Object, Result};

    pub(crate) use crate::graphql::auth::{AuthExt, ClientInfo};
    pub(crate) use crate::graphql::svc;
    pub(crate) use crate::graphql::types::*;
}
