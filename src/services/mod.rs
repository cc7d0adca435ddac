//! Domain services
//!
//! One service per domain, each owning its business rules and talking to the
//! repositories in [crate::db]. Transport layers (GraphQL, REST, jobs) only
//! call into these.

pub mod accounts;
pub mod analytics;
pub mod auth;
pub mod catalog;
pub mod circulation;
pub mod content;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod notifications;
pub mod repository;
pub mod rules;
pub mod study_rooms;

use std::sync::Arc;

use crate::config::{CirculationPolicy, Config};
use crate::db::{Database, MembershipType, Role, UserRecord};

pub use accounts::{AccountsService, AuthPayload, ProfilePatch, RegisterInput};
pub use analytics::{AnalyticsDashboard, AnalyticsService};
pub use auth::{AuthConfig, AuthService, IssuedToken};
pub use catalog::{BookAvailability, CatalogService, NewBook};
pub use circulation::{
    CheckInInput, CirculationService, PatronDashboard, ReturnOutcome, StaffDashboard,
};
pub use content::{ContentService, NewEvent};
pub use error::{ServiceError, ServiceResult};
pub use metrics::{MetricsCollector, SharedMetrics, create_metrics_collector};
pub use notifications::{DbNotifier, NotificationService, Notifier};
pub use repository::{
    NewEBook, RepositoryService, SearchResults, SearchSuggestion, SuggestionKind,
};
pub use study_rooms::{BookingRequest, RoomAvailability, StudyRoomService, TimeSlot};

/// The authenticated caller of an operation
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub membership_type: MembershipType,
    /// Admin, or an active member of the Staff group
    pub is_staff: bool,
}

impl Actor {
    pub fn for_user(user: &UserRecord, is_staff: bool) -> Self {
        Self {
            user_id: user.id.clone(),
            username: user.username.clone(),
            role: user.role,
            membership_type: user.membership_type,
            is_staff: is_staff || user.role == Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_staff(&self) -> ServiceResult<()> {
        if self.is_staff {
            Ok(())
        } else {
            Err(ServiceError::forbidden("Staff access required"))
        }
    }

    pub fn require_admin(&self) -> ServiceResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::forbidden("Admin access required"))
        }
    }

    /// Owners act on their own rows; staff act on anyone's
    pub fn require_owner_or_staff(&self, owner_id: &str) -> ServiceResult<()> {
        if self.is_staff || self.user_id == owner_id {
            Ok(())
        } else {
            Err(ServiceError::forbidden("You can only manage your own records"))
        }
    }

    /// Restrict a listing to the caller's own rows unless they are staff
    pub fn visible_owner(&self, requested: Option<String>) -> Option<String> {
        if self.is_staff {
            requested
        } else {
            Some(self.user_id.clone())
        }
    }
}

/// Every domain service, wired to one database
#[derive(Clone)]
pub struct Services {
    pub auth: AuthService,
    pub accounts: AccountsService,
    pub notifications: NotificationService,
    pub study_rooms: StudyRoomService,
    pub catalog: CatalogService,
    pub circulation: CirculationService,
    pub repository: RepositoryService,
    pub analytics: AnalyticsService,
    pub content: ContentService,
    pub metrics: SharedMetrics,
}

impl Services {
    pub fn from_config(db: Database, config: &Config, metrics: SharedMetrics) -> Self {
        Self::build(
            db,
            AuthConfig::from_config(config),
            config.policy.clone(),
            metrics,
        )
    }

    pub fn build(
        db: Database,
        auth_config: AuthConfig,
        policy: CirculationPolicy,
        metrics: SharedMetrics,
    ) -> Self {
        let notifier: Arc<dyn Notifier> = DbNotifier::shared(db.clone());
        let auth = AuthService::new(db.clone(), auth_config);
        let analytics = AnalyticsService::new(db.clone(), metrics.clone());

        Self {
            accounts: AccountsService::new(
                db.clone(),
                auth.clone(),
                analytics.clone(),
                notifier.clone(),
            ),
            notifications: NotificationService::new(db.clone()),
            study_rooms: StudyRoomService::new(db.clone(), policy.clone(), notifier.clone()),
            catalog: CatalogService::new(db.clone(), analytics.clone()),
            circulation: CirculationService::new(
                db.clone(),
                policy,
                analytics.clone(),
                notifier.clone(),
            ),
            repository: RepositoryService::new(db.clone(), analytics.clone(), notifier),
            content: ContentService::new(db),
            auth,
            analytics,
            metrics,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixtures shared by the service tests

    use super::*;
    use crate::db::CreateUser;

    pub async fn test_db() -> Database {
        Database::connect_in_memory().await.unwrap()
    }

    pub fn test_services(db: &Database) -> Services {
        Services::build(
            db.clone(),
            AuthConfig::for_tests(),
            CirculationPolicy::default(),
            create_metrics_collector(),
        )
    }

    /// Active member of the given tier with password `password123`
    pub async fn member(db: &Database, username: &str, membership: MembershipType) -> UserRecord {
        db.users()
            .create(CreateUser {
                username: username.to_string(),
                email: format!("{}@uni.edu", username),
                password_hash: bcrypt::hash("password123", 4).unwrap(),
                first_name: username.to_string(),
                last_name: "Tester".to_string(),
                membership_type: membership,
                department: "Library Science".to_string(),
                student_id: None,
                faculty_id: None,
                staff_id: None,
                phone: String::new(),
                role: Role::Member,
                is_staff_approved: membership == MembershipType::Staff,
                email_verified: true,
                is_active: true,
            })
            .await
            .unwrap()
    }

    pub async fn member_actor(db: &Database, username: &str, membership: MembershipType) -> Actor {
        let user = member(db, username, membership).await;
        Actor::for_user(&user, false)
    }

    /// Active member of the Staff group
    pub async fn staff_actor(db: &Database, username: &str) -> Actor {
        let user = member(db, username, MembershipType::Staff).await;
        Actor::for_user(&user, true)
    }
}
