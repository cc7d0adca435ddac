pub mod accounts;
pub mod analytics;
pub mod catalog;
pub mod circulation;
pub mod content;
pub mod notifications;
pub mod repository;
pub mod study_rooms;

pub use accounts::AccountQueries;
pub use analytics::AnalyticsQueries;
pub use catalog::CatalogQueries;
pub use circulation::CirculationQueries;
pub use content::ContentQueries;
pub use notifications::NotificationQueries;
pub use repository::RepositoryQueries;
pub use study_rooms::StudyRoomQueries;

pub(crate) mod prelude {
    pub(crate) use async_graphql::{Context, Object, Result};

    pub(crate) use crate::graphql::auth::{AuthExt, AuthGuard, StaffGuard};
    pub(crate) use crate::graphql::svc;
    pub(crate) use crate::graphql::types::*;
}
