//! In-app notifications
//!
//! Domain services announce decisions (approvals, booking outcomes, request
//! reviews) through the [Notifier] trait. Delivery failures are logged and
//! never fail the operation that triggered them.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::db::{CreateNotification, Database, NotificationCategory, NotificationRecord};

use super::{Actor, ServiceError, ServiceResult};

/// Sink for user-facing notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        user_id: &str,
        category: NotificationCategory,
        title: &str,
        message: &str,
    );
}

/// Stores notifications as rows the user can list and mark read
pub struct DbNotifier {
    db: Database,
}

impl DbNotifier {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn shared(db: Database) -> Arc<dyn Notifier> {
        Arc::new(Self::new(db))
    }
}

#[async_trait]
impl Notifier for DbNotifier {
    async fn notify(
        &self,
        user_id: &str,
        category: NotificationCategory,
        title: &str,
        message: &str,
    ) {
        let result = self
            .db
            .notifications()
            .create(CreateNotification {
                user_id: user_id.to_string(),
                title: title.to_string(),
                message: message.to_string(),
                category,
            })
            .await;

        match result {
            Ok(record) => debug!(notification_id = %record.id, user_id = %user_id, "Notification stored"),
            Err(e) => warn!(user_id = %user_id, error = %e, "Failed to store notification"),
        }
    }
}

/// Read side of notifications for the signed-in user
#[derive(Clone)]
pub struct NotificationService {
    db: Database,
}

impl NotificationService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn my_notifications(
        &self,
        actor: &Actor,
        unread_only: bool,
        limit: i64,
    ) -> ServiceResult<Vec<NotificationRecord>> {
        Ok(self
            .db
            .notifications()
            .list_for_user(&actor.user_id, unread_only, limit.clamp(1, 200))
            .await?)
    }

    pub async fn unread_count(&self, actor: &Actor) -> ServiceResult<i64> {
        Ok(self.db.notifications().unread_count(&actor.user_id).await?)
    }

    pub async fn mark_read(&self, actor: &Actor, id: &str) -> ServiceResult<NotificationRecord> {
        let notifications = self.db.notifications();
        if !notifications.mark_read(id, &actor.user_id).await? {
            return Err(ServiceError::not_found("Notification not found"));
        }
        notifications
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Notification not found"))
    }

    pub async fn mark_all_read(&self, actor: &Actor) -> ServiceResult<u64> {
        Ok(self.db.notifications().mark_all_read(&actor.user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MembershipType;
    use crate::services::test_support::{member, test_db};
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_notify_then_mark_read() {
        let db = test_db().await;
        let user = member(&db, "grace", MembershipType::Faculty).await;
        let actor = Actor::for_user(&user, false);

        DbNotifier::new(db.clone())
            .notify(&user.id, NotificationCategory::Booking, "Booking confirmed", "See you there")
            .await;

        let service = NotificationService::new(db.clone());
        let unread = service.my_notifications(&actor, true, 10).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(service.unread_count(&actor).await.unwrap(), 1);

        let read = service.mark_read(&actor, &unread[0].id).await.unwrap();
        assert!(read.read_at.is_some());
        assert_eq!(service.unread_count(&actor).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cannot_mark_someone_elses_notification() {
        let db = test_db().await;
        let owner = member(&db, "owner", MembershipType::Student).await;
        let other = member(&db, "other", MembershipType::Student).await;

        DbNotifier::new(db.clone())
            .notify(&owner.id, NotificationCategory::Account, "Hello", "")
            .await;
        let id = db.notifications().list_for_user(&owner.id, false, 10).await.unwrap()[0]
            .id
            .clone();

        let service = NotificationService::new(db);
        let intruder = Actor::for_user(&other, false);
        assert_matches!(
            service.mark_read(&intruder, &id).await,
            Err(ServiceError::NotFound(_))
        );
    }
}
