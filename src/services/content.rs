//! Blog posts and library events

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::info;

use crate::db::sqlite_helpers::{now_utc, to_storage};
use crate::db::{
    BlogPostRecord, CreateEvent, Database, EventRecord, EventRegistrationRecord, PostStatus,
    RegisterOutcome,
};

use super::{Actor, ServiceError, ServiceResult};

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub location: String,
    pub max_attendees: Option<i64>,
    pub registration_deadline: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct ContentService {
    db: Database,
}

impl ContentService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // ========================================================================
    // Blog
    // ========================================================================

    /// New posts start as drafts
    pub async fn create_post(&self, actor: &Actor, title: &str, content: &str) -> ServiceResult<BlogPostRecord> {
        actor.require_staff()?;
        let title = title.trim();
        if title.is_empty() {
            return Err(ServiceError::validation("Title is required"));
        }
        let post = self
            .db
            .content()
            .create_post(title, content, &actor.user_id)
            .await?;
        info!(post_id = %post.id, "Blog post drafted");
        Ok(post)
    }

    pub async fn update_post(
        &self,
        actor: &Actor,
        id: &str,
        title: Option<&str>,
        content: Option<&str>,
    ) -> ServiceResult<BlogPostRecord> {
        actor.require_staff()?;
        let title = title.map(str::trim);
        if title.is_some_and(str::is_empty) {
            return Err(ServiceError::validation("Title cannot be empty"));
        }
        if !self.db.content().update_post(id, title, content).await? {
            return Err(ServiceError::not_found("Blog post not found"));
        }
        self.load_post(id).await
    }

    pub async fn publish_post(&self, actor: &Actor, id: &str) -> ServiceResult<BlogPostRecord> {
        actor.require_staff()?;
        if !self.db.content().publish_post(id, now_utc()).await? {
            return Err(ServiceError::not_found("Blog post not found"));
        }
        info!(post_id = %id, "Blog post published");
        self.load_post(id).await
    }

    pub async fn unpublish_post(&self, actor: &Actor, id: &str) -> ServiceResult<BlogPostRecord> {
        actor.require_staff()?;
        if !self.db.content().unpublish_post(id).await? {
            return Err(ServiceError::not_found("Blog post not found"));
        }
        info!(post_id = %id, "Blog post unpublished");
        self.load_post(id).await
    }

    /// Drafts are visible to staff only
    pub async fn list_posts(&self, actor: Option<&Actor>) -> ServiceResult<Vec<BlogPostRecord>> {
        let published_only = !actor.is_some_and(|a| a.is_staff);
        Ok(self.db.content().list_posts(published_only).await?)
    }

    pub async fn get_post(&self, actor: Option<&Actor>, id: &str) -> ServiceResult<BlogPostRecord> {
        let post = self.load_post(id).await?;
        if post.status != PostStatus::Published && !actor.is_some_and(|a| a.is_staff) {
            return Err(ServiceError::not_found("Blog post not found"));
        }
        Ok(post)
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub async fn create_event(&self, actor: &Actor, event: NewEvent) -> ServiceResult<EventRecord> {
        actor.require_staff()?;
        let title = event.title.trim().to_string();
        if title.is_empty() {
            return Err(ServiceError::validation("Title is required"));
        }
        if event.max_attendees.is_some_and(|max| max < 1) {
            return Err(ServiceError::validation("Maximum attendees must be at least 1"));
        }

        let created = self
            .db
            .content()
            .create_event(CreateEvent {
                title,
                description: event.description,
                date: event.date,
                time: event.time,
                location: event.location.trim().to_string(),
                organizer_id: actor.user_id.clone(),
                max_attendees: event.max_attendees,
                registration_deadline: event.registration_deadline,
            })
            .await?;
        info!(event_id = %created.id, date = %created.date, "Event created");
        Ok(created)
    }

    pub async fn get_event(&self, id: &str) -> ServiceResult<EventRecord> {
        self.db
            .content()
            .get_event(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Event not found"))
    }

    pub async fn list_upcoming(&self, today: NaiveDate) -> ServiceResult<Vec<EventRecord>> {
        Ok(self.db.content().list_upcoming(today).await?)
    }

    pub async fn registration_count(&self, event_id: &str) -> ServiceResult<i64> {
        Ok(self.db.content().registration_count(event_id).await?)
    }

    /// Remaining places, or `None` for events without a cap
    pub async fn spots_left(&self, event: &EventRecord) -> ServiceResult<Option<i64>> {
        match event.max_attendees {
            Some(max) => {
                let taken = self.registration_count(&event.id).await?;
                Ok(Some((max - taken).max(0)))
            }
            None => Ok(None),
        }
    }

    pub async fn register_for_event(&self, actor: &Actor, event_id: &str) -> ServiceResult<EventRegistrationRecord> {
        self.register_for_event_at(actor, event_id, now_utc()).await
    }

    /// Sign up for an event. Registration is open only until the event's
    /// deadline; events without one do not take registrations.
    pub async fn register_for_event_at(
        &self,
        actor: &Actor,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<EventRegistrationRecord> {
        let now = to_storage(now);
        let event = self.get_event(event_id).await?;
        match event.registration_deadline {
            Some(deadline) if now <= deadline => {}
            _ => return Err(ServiceError::invalid_state("Registration for this event is closed")),
        }

        let content = self.db.content();
        match content
            .register(&event.id, &actor.user_id, event.max_attendees)
            .await?
        {
            RegisterOutcome::Registered(id) => {
                info!(event_id = %event.id, user_id = %actor.user_id, "Registered for event");
                let registrations = content.registrations_for_user(&actor.user_id).await?;
                registrations
                    .into_iter()
                    .find(|r| r.id == id)
                    .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("Registration {} vanished", id)))
            }
            RegisterOutcome::AlreadyRegistered => {
                Err(ServiceError::conflict("You are already registered for this event"))
            }
            RegisterOutcome::Full => Err(ServiceError::invalid_state("This event is full")),
        }
    }

    pub async fn unregister(&self, actor: &Actor, event_id: &str) -> ServiceResult<()> {
        if !self.db.content().unregister(event_id, &actor.user_id).await? {
            return Err(ServiceError::not_found("You are not registered for this event"));
        }
        info!(event_id = %event_id, user_id = %actor.user_id, "Unregistered from event");
        Ok(())
    }

    pub async fn my_registrations(&self, actor: &Actor) -> ServiceResult<Vec<EventRegistrationRecord>> {
        Ok(self.db.content().registrations_for_user(&actor.user_id).await?)
    }

    async fn load_post(&self, id: &str) -> ServiceResult<BlogPostRecord> {
        self.db
            .content()
            .get_post(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Blog post not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MembershipType;
    use crate::services::test_support::{member_actor, staff_actor, test_db, test_services};
    use assert_matches::assert_matches;
    use chrono::Duration;

    fn event(max: Option<i64>, deadline: Option<DateTime<Utc>>) -> NewEvent {
        NewEvent {
            title: "Book Fair".into(),
            description: "Annual fair".into(),
            date: NaiveDate::from_ymd_opt(2030, 5, 1).unwrap(),
            time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            location: "Main Hall".into(),
            max_attendees: max,
            registration_deadline: deadline,
        }
    }

    #[tokio::test]
    async fn test_drafts_hidden_from_patrons() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Student).await;

        let post = services.content.create_post(&staff, "Opening hours", "We open at 8").await.unwrap();
        assert_eq!(post.status, PostStatus::Draft);
        assert!(services.content.list_posts(Some(&patron)).await.unwrap().is_empty());
        assert_matches!(
            services.content.get_post(None, &post.id).await,
            Err(ServiceError::NotFound(_))
        );

        let published = services.content.publish_post(&staff, &post.id).await.unwrap();
        let first_date = published.published_date.unwrap();
        assert_eq!(services.content.list_posts(None).await.unwrap().len(), 1);

        services.content.unpublish_post(&staff, &post.id).await.unwrap();
        let again = services.content.publish_post(&staff, &post.id).await.unwrap();
        assert_eq!(again.published_date, Some(first_date));

        assert_matches!(
            services.content.create_post(&patron, "Hi", "").await,
            Err(ServiceError::Forbidden(_))
        );
    }

    #[tokio::test]
    async fn test_event_registration_rules() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let first = member_actor(&db, "first", MembershipType::Student).await;
        let second = member_actor(&db, "second", MembershipType::Student).await;

        let now = Utc::now();
        let fair = services
            .content
            .create_event(&staff, event(Some(1), Some(now + Duration::days(1))))
            .await
            .unwrap();

        services.content.register_for_event_at(&first, &fair.id, now).await.unwrap();
        assert_matches!(
            services.content.register_for_event_at(&first, &fair.id, now).await,
            Err(ServiceError::Conflict(_))
        );
        assert_matches!(
            services.content.register_for_event_at(&second, &fair.id, now).await,
            Err(ServiceError::InvalidState(_))
        );
        assert_eq!(services.content.spots_left(&fair).await.unwrap(), Some(0));

        services.content.unregister(&first, &fair.id).await.unwrap();
        assert_matches!(
            services
                .content
                .register_for_event_at(&second, &fair.id, now + Duration::days(2))
                .await,
            Err(ServiceError::InvalidState(_))
        );
        services.content.register_for_event_at(&second, &fair.id, now).await.unwrap();
    }

    #[tokio::test]
    async fn test_events_without_deadline_are_closed() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Public).await;

        let talk = services.content.create_event(&staff, event(None, None)).await.unwrap();
        assert_matches!(
            services.content.register_for_event(&patron, &talk.id).await,
            Err(ServiceError::InvalidState(_))
        );

        let today = NaiveDate::from_ymd_opt(2030, 5, 1).unwrap();
        assert_eq!(services.content.list_upcoming(today).await.unwrap().len(), 1);
        assert!(
            services
                .content
                .list_upcoming(today.succ_opt().unwrap())
                .await
                .unwrap()
                .is_empty()
        );
    }
}
