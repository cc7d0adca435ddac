//! Digital repository: eBooks, access control and site-wide search

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::db::{
    AccessLevel, BookFilter, BookRecord, CollectionRecord, CreateAnalyticsEvent, CreateEBook, Database,
    EBookPermissionRecord, EBookRecord, EBookScope, EventType, ItemType, MembershipType,
    NotificationCategory, PermissionRequestRecord, PermissionRequestStatus,
};

use super::analytics::AnalyticsService;
use super::notifications::Notifier;
use super::rules;
use super::{Actor, ServiceError, ServiceResult};

/// Shortest query the global search answers
const MIN_QUERY_LEN: usize = 2;
const SUGGESTIONS_PER_KIND: i64 = 5;
const MAX_SUGGESTIONS: usize = 10;

/// eBook metadata submitted by staff; the file itself is stored elsewhere
#[derive(Debug, Clone, Default)]
pub struct NewEBook {
    pub title: String,
    pub authors: String,
    pub abstract_text: String,
    pub file_path: String,
    pub access_level: AccessLevel,
    pub doi: Option<String>,
    pub collection_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub query: String,
    pub books: Vec<BookRecord>,
    pub ebooks: Vec<EBookRecord>,
}

impl SearchResults {
    fn empty(query: &str) -> Self {
        Self {
            query: query.to_string(),
            books: Vec::new(),
            ebooks: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.books.len() + self.ebooks.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, async_graphql::Enum)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Book,
    Author,
    Ebook,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchSuggestion {
    pub text: String,
    pub kind: SuggestionKind,
}

#[derive(Clone)]
pub struct RepositoryService {
    db: Database,
    analytics: AnalyticsService,
    notifier: Arc<dyn Notifier>,
}

impl RepositoryService {
    pub fn new(db: Database, analytics: AnalyticsService, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            analytics,
            notifier,
        }
    }

    // ========================================================================
    // Access
    // ========================================================================

    /// Open eBooks are public; every other level needs a granted permission
    pub async fn can_access(&self, actor: Option<&Actor>, ebook: &EBookRecord) -> ServiceResult<bool> {
        if ebook.access_level == AccessLevel::Open {
            return Ok(true);
        }
        match actor {
            Some(actor) => Ok(self
                .db
                .ebooks()
                .has_granted_permission(&ebook.id, &actor.user_id)
                .await?),
            None => Ok(false),
        }
    }

    // ========================================================================
    // Collections and eBooks
    // ========================================================================

    pub async fn create_collection(
        &self,
        actor: &Actor,
        name: &str,
        description: &str,
    ) -> ServiceResult<CollectionRecord> {
        actor.require_staff()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::validation("Collection name is required"));
        }
        let collection = self
            .db
            .ebooks()
            .create_collection(name, description.trim(), Some(&actor.user_id))
            .await?;
        info!(collection_id = %collection.id, "Collection created");
        Ok(collection)
    }

    pub async fn list_collections(&self) -> ServiceResult<Vec<CollectionRecord>> {
        Ok(self.db.ebooks().list_collections().await?)
    }

    pub async fn upload_ebook(&self, actor: &Actor, ebook: NewEBook) -> ServiceResult<EBookRecord> {
        actor.require_staff()?;
        let title = ebook.title.trim().to_string();
        let file_path = ebook.file_path.trim().to_string();
        if title.is_empty() || file_path.is_empty() {
            return Err(ServiceError::validation("Title and file path are required"));
        }

        let repo = self.db.ebooks();
        let doi = ebook
            .doi
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        if let Some(ref doi) = doi
            && repo.doi_taken(doi).await?
        {
            return Err(ServiceError::conflict("An eBook with this DOI already exists"));
        }
        if let Some(ref collection_id) = ebook.collection_id
            && repo.get_collection(collection_id).await?.is_none()
        {
            return Err(ServiceError::not_found("Collection not found"));
        }

        let created = repo
            .create_ebook(CreateEBook {
                title,
                authors: ebook.authors.trim().to_string(),
                abstract_text: ebook.abstract_text.trim().to_string(),
                file_path,
                access_level: ebook.access_level,
                doi,
                collection_id: ebook.collection_id,
                uploaded_by: actor.user_id.clone(),
            })
            .await?;

        info!(ebook_id = %created.id, access_level = ?created.access_level, "eBook uploaded");
        Ok(created)
    }

    pub async fn update_access_level(
        &self,
        actor: &Actor,
        id: &str,
        level: AccessLevel,
    ) -> ServiceResult<EBookRecord> {
        actor.require_staff()?;
        if !self.db.ebooks().set_access_level(id, level).await? {
            return Err(ServiceError::not_found("eBook not found"));
        }
        info!(ebook_id = %id, access_level = ?level, "eBook access level changed");
        self.load_ebook(id).await
    }

    /// eBooks the caller may open. Staff can ask for the full inventory.
    pub async fn list_ebooks(
        &self,
        actor: Option<&Actor>,
        search: Option<&str>,
        include_inaccessible: bool,
        limit: i64,
    ) -> ServiceResult<Vec<EBookRecord>> {
        let scope = match actor {
            Some(actor) if include_inaccessible => {
                actor.require_staff()?;
                EBookScope::All
            }
            _ => EBookScope::AccessibleTo(actor.map(|a| a.user_id.clone())),
        };
        Ok(self
            .db
            .ebooks()
            .list_ebooks(&scope, search, limit.clamp(1, 200))
            .await?)
    }

    /// Metadata is visible to anyone who can find the eBook
    pub async fn get_ebook(&self, id: &str) -> ServiceResult<EBookRecord> {
        self.load_ebook(id).await
    }

    /// Resolve the stored file of an eBook the caller may access
    pub async fn download(&self, actor: Option<&Actor>, id: &str) -> ServiceResult<String> {
        let ebook = self.load_ebook(id).await?;
        if !self.can_access(actor, &ebook).await? {
            return Err(ServiceError::forbidden("You do not have access to this eBook"));
        }

        let mut event = CreateAnalyticsEvent::new(EventType::Download, actor.map(|a| a.user_id.as_str()));
        event.document_id = Some(ebook.id.clone());
        self.analytics.record(event).await;
        self.analytics.bump(ItemType::Document, &ebook.id, 0, 1, 0).await;

        info!(ebook_id = %ebook.id, "eBook downloaded");
        Ok(ebook.file_path)
    }

    // ========================================================================
    // Permissions
    // ========================================================================

    /// File a request for a restricted eBook. Only members of the Staff
    /// group may ask.
    pub async fn request_permission(
        &self,
        actor: &Actor,
        ebook_id: &str,
        reason: &str,
    ) -> ServiceResult<PermissionRequestRecord> {
        let users = self.db.users();
        if !users
            .is_in_group(&actor.user_id, MembershipType::Staff.group_name())
            .await?
        {
            return Err(ServiceError::forbidden("Only staff members can request eBook access"));
        }

        let ebook = self.load_ebook(ebook_id).await?;
        if ebook.access_level == AccessLevel::Open {
            return Err(ServiceError::invalid_state("This eBook is open to everyone"));
        }

        let repo = self.db.ebooks();
        if repo.has_granted_permission(ebook_id, &actor.user_id).await? {
            return Err(ServiceError::conflict("You already have access to this eBook"));
        }
        let request = repo
            .create_request_if_none_pending(ebook_id, &actor.user_id, reason.trim())
            .await?
            .ok_or_else(|| ServiceError::conflict("You already have a pending request for this eBook"))?;

        info!(request_id = %request.id, ebook_id = %ebook_id, user_id = %actor.user_id, "eBook access requested");
        Ok(request)
    }

    pub async fn list_permission_requests(
        &self,
        actor: &Actor,
        user_id: Option<String>,
        status: Option<PermissionRequestStatus>,
    ) -> ServiceResult<Vec<PermissionRequestRecord>> {
        let owner = actor.visible_owner(user_id);
        Ok(self.db.ebooks().list_requests(owner.as_deref(), status).await?)
    }

    pub async fn approve_request(
        &self,
        actor: &Actor,
        id: &str,
        notes: &str,
    ) -> ServiceResult<PermissionRequestRecord> {
        actor.require_staff()?;
        let request = self.load_request(id).await?;
        ensure_transition(request.status, PermissionRequestStatus::Approved)?;

        if !self
            .db
            .ebooks()
            .approve_request(&request, &actor.user_id, notes.trim())
            .await?
        {
            return Err(ServiceError::invalid_state("Request is no longer pending"));
        }

        self.notify_decision(&request, "approved").await;
        info!(request_id = %id, reviewer = %actor.user_id, "eBook access approved");
        self.load_request(id).await
    }

    pub async fn reject_request(
        &self,
        actor: &Actor,
        id: &str,
        notes: &str,
    ) -> ServiceResult<PermissionRequestRecord> {
        actor.require_staff()?;
        let request = self.load_request(id).await?;
        self.close_request(&request, PermissionRequestStatus::Rejected, Some(&actor.user_id), notes.trim())
            .await?;
        self.notify_decision(&request, "rejected").await;
        self.load_request(id).await
    }

    pub async fn cancel_request(&self, actor: &Actor, id: &str) -> ServiceResult<PermissionRequestRecord> {
        let request = self.load_request(id).await?;
        if request.user_id != actor.user_id {
            return Err(ServiceError::forbidden("You can only cancel your own requests"));
        }
        self.close_request(&request, PermissionRequestStatus::Cancelled, None, &request.review_notes)
            .await?;
        self.load_request(id).await
    }

    /// Direct grant by staff, without a request
    pub async fn grant_permission(
        &self,
        actor: &Actor,
        ebook_id: &str,
        user_id: &str,
    ) -> ServiceResult<EBookPermissionRecord> {
        actor.require_staff()?;
        self.load_ebook(ebook_id).await?;
        if self.db.users().get_by_id(user_id).await?.is_none() {
            return Err(ServiceError::not_found("User not found"));
        }

        let permission = self
            .db
            .ebooks()
            .grant_permission(ebook_id, user_id, &actor.user_id)
            .await?;
        info!(ebook_id = %ebook_id, user_id = %user_id, granted_by = %actor.user_id, "eBook access granted");
        Ok(permission)
    }

    pub async fn revoke_permission(&self, actor: &Actor, ebook_id: &str, user_id: &str) -> ServiceResult<()> {
        actor.require_staff()?;
        if !self.db.ebooks().revoke_permission(ebook_id, user_id).await? {
            return Err(ServiceError::not_found("No granted permission to revoke"));
        }
        info!(ebook_id = %ebook_id, user_id = %user_id, "eBook access revoked");
        Ok(())
    }

    pub async fn list_permissions(&self, actor: &Actor, ebook_id: &str) -> ServiceResult<Vec<EBookPermissionRecord>> {
        actor.require_staff()?;
        Ok(self.db.ebooks().list_permissions(ebook_id).await?)
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Books and accessible eBooks matching `query`, half of `limit` each
    pub async fn global_search(&self, actor: Option<&Actor>, query: &str, limit: i64) -> ServiceResult<SearchResults> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return Ok(SearchResults::empty(query));
        }
        let per_kind = (limit / 2).max(1);

        let filter = BookFilter {
            query: Some(query.to_string()),
            ..Default::default()
        };
        let (books, _) = self.db.catalog().search_books(&filter, per_kind, 0).await?;
        let scope = EBookScope::AccessibleTo(actor.map(|a| a.user_id.clone()));
        let ebooks = self.db.ebooks().list_ebooks(&scope, Some(query), per_kind).await?;

        let mut event = CreateAnalyticsEvent::new(EventType::Search, actor.map(|a| a.user_id.as_str()));
        event.search_query = query.to_string();
        event.metadata = serde_json::json!({
            "books": books.len(),
            "ebooks": ebooks.len(),
        });
        self.analytics.record(event).await;
        for book in &books {
            self.analytics.bump(ItemType::Book, &book.id, 0, 0, 1).await;
        }
        for ebook in &ebooks {
            self.analytics.bump(ItemType::Document, &ebook.id, 0, 0, 1).await;
        }

        Ok(SearchResults {
            query: query.to_string(),
            books,
            ebooks,
        })
    }

    /// Type-ahead: book titles, then author names, then eBook titles
    pub async fn search_suggestions(&self, actor: Option<&Actor>, query: &str) -> ServiceResult<Vec<SearchSuggestion>> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return Ok(Vec::new());
        }

        let catalog = self.db.catalog();
        let titles = catalog.suggest_titles(query, SUGGESTIONS_PER_KIND).await?;
        let authors = catalog.suggest_authors(query, SUGGESTIONS_PER_KIND).await?;
        let ebooks = self
            .db
            .ebooks()
            .suggest_titles(query, actor.map(|a| a.user_id.as_str()), SUGGESTIONS_PER_KIND)
            .await?;

        let tagged = |items: Vec<String>, kind: SuggestionKind| {
            items.into_iter().map(move |text| SearchSuggestion { text, kind })
        };
        Ok(tagged(titles, SuggestionKind::Book)
            .chain(tagged(authors, SuggestionKind::Author))
            .chain(tagged(ebooks, SuggestionKind::Ebook))
            .take(MAX_SUGGESTIONS)
            .collect())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn close_request(
        &self,
        request: &PermissionRequestRecord,
        to: PermissionRequestStatus,
        reviewer: Option<&str>,
        notes: &str,
    ) -> ServiceResult<()> {
        ensure_transition(request.status, to)?;
        if !self
            .db
            .ebooks()
            .close_request(&request.id, to, reviewer, notes)
            .await?
        {
            return Err(ServiceError::invalid_state("Request is no longer pending"));
        }
        info!(request_id = %request.id, status = ?to, "eBook access request closed");
        Ok(())
    }

    async fn notify_decision(&self, request: &PermissionRequestRecord, outcome: &str) {
        let title = match self.db.ebooks().get_ebook(&request.ebook_id).await {
            Ok(Some(ebook)) => ebook.title,
            _ => "an eBook".to_string(),
        };
        self.notifier
            .notify(
                &request.user_id,
                NotificationCategory::Permission,
                &format!("Access request {}", outcome),
                &format!("Your request to access \"{}\" was {}.", title, outcome),
            )
            .await;
    }

    async fn load_ebook(&self, id: &str) -> ServiceResult<EBookRecord> {
        self.db
            .ebooks()
            .get_ebook(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("eBook not found"))
    }

    async fn load_request(&self, id: &str) -> ServiceResult<PermissionRequestRecord> {
        self.db
            .ebooks()
            .get_request(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Permission request not found"))
    }
}

fn ensure_transition(from: PermissionRequestStatus, to: PermissionRequestStatus) -> ServiceResult<()> {
    if rules::permission_request_transition_allowed(from, to) {
        Ok(())
    } else {
        Err(ServiceError::invalid_state(format!(
            "Request is {:?} and cannot become {:?}",
            from, to
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::Services;
    use crate::services::catalog::tests::seed_book;
    use crate::services::test_support::{member_actor, staff_actor, test_db, test_services};
    use assert_matches::assert_matches;

    async fn upload(services: &Services, staff: &Actor, title: &str, level: AccessLevel) -> EBookRecord {
        services
            .repository
            .upload_ebook(
                staff,
                NewEBook {
                    title: title.to_string(),
                    authors: "A. Writer".into(),
                    abstract_text: format!("A study of {}", title),
                    file_path: format!("/files/{}.pdf", title),
                    access_level: level,
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_ebooks_are_public_others_need_grant() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let reader = member_actor(&db, "rae", MembershipType::Student).await;

        let open = upload(&services, &staff, "Rivers", AccessLevel::Open).await;
        let embargoed = upload(&services, &staff, "Deltas", AccessLevel::Embargo).await;

        let repo = &services.repository;
        assert!(repo.can_access(None, &open).await.unwrap());
        assert!(!repo.can_access(None, &embargoed).await.unwrap());
        // Staff status alone does not open an eBook
        assert!(!repo.can_access(Some(&staff), &embargoed).await.unwrap());
        assert!(!repo.can_access(Some(&reader), &embargoed).await.unwrap());

        repo.grant_permission(&staff, &embargoed.id, &reader.user_id).await.unwrap();
        assert!(repo.can_access(Some(&reader), &embargoed).await.unwrap());

        let listed = repo.list_ebooks(Some(&reader), None, false, 50).await.unwrap();
        assert_eq!(listed.len(), 2);
        let anonymous = repo.list_ebooks(None, None, false, 50).await.unwrap();
        assert_eq!(anonymous.len(), 1);

        repo.revoke_permission(&staff, &embargoed.id, &reader.user_id).await.unwrap();
        assert_matches!(
            repo.download(Some(&reader), &embargoed.id).await,
            Err(ServiceError::Forbidden(_))
        );
    }

    #[tokio::test]
    async fn test_download_counts_as_checkout() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let open = upload(&services, &staff, "Rivers", AccessLevel::Open).await;

        let path = services.repository.download(None, &open.id).await.unwrap();
        assert_eq!(path, "/files/Rivers.pdf");

        let item = db
            .analytics()
            .get_popularity(ItemType::Document, &open.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.checkout_count, 1);
        assert_eq!(item.total_score, 5);
    }

    #[tokio::test]
    async fn test_duplicate_doi_is_rejected() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;

        let first = NewEBook {
            title: "Rivers".into(),
            file_path: "/files/rivers.pdf".into(),
            doi: Some("10.1000/xyz123".into()),
            ..Default::default()
        };
        services.repository.upload_ebook(&staff, first.clone()).await.unwrap();

        let mut second = first;
        second.doi = Some("10.1000/XYZ123".into());
        assert_matches!(
            services.repository.upload_ebook(&staff, second).await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn test_permission_request_state_machine() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let colleague = staff_actor(&db, "cole").await;
        let student = member_actor(&db, "stu", MembershipType::Student).await;
        let repo = &services.repository;

        let open = upload(&services, &staff, "Rivers", AccessLevel::Open).await;
        let private = upload(&services, &staff, "Deltas", AccessLevel::Private).await;

        assert_matches!(
            repo.request_permission(&student, &private.id, "thesis").await,
            Err(ServiceError::Forbidden(_))
        );
        assert_matches!(
            repo.request_permission(&colleague, &open.id, "thesis").await,
            Err(ServiceError::InvalidState(_))
        );

        let request = repo.request_permission(&colleague, &private.id, "thesis").await.unwrap();
        assert_eq!(request.status, PermissionRequestStatus::Pending);
        assert_matches!(
            repo.request_permission(&colleague, &private.id, "again").await,
            Err(ServiceError::Conflict(_))
        );

        let approved = repo.approve_request(&staff, &request.id, "ok").await.unwrap();
        assert_eq!(approved.status, PermissionRequestStatus::Approved);
        assert!(repo.can_access(Some(&colleague), &private).await.unwrap());

        // Resolved requests never reopen
        assert_matches!(
            repo.reject_request(&staff, &request.id, "changed my mind").await,
            Err(ServiceError::InvalidState(_))
        );
        assert_matches!(
            repo.request_permission(&colleague, &private.id, "more").await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn test_reject_and_cancel_requests() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let colleague = staff_actor(&db, "cole").await;
        let repo = &services.repository;
        let restricted = upload(&services, &staff, "Deltas", AccessLevel::Restricted).await;

        let first = repo.request_permission(&colleague, &restricted.id, "").await.unwrap();
        let rejected = repo.reject_request(&staff, &first.id, "Not relevant").await.unwrap();
        assert_eq!(rejected.status, PermissionRequestStatus::Rejected);
        assert_eq!(rejected.review_notes, "Not relevant");
        assert!(!repo.can_access(Some(&colleague), &restricted).await.unwrap());

        let second = repo.request_permission(&colleague, &restricted.id, "").await.unwrap();
        assert_matches!(
            repo.cancel_request(&staff, &second.id).await,
            Err(ServiceError::Forbidden(_))
        );
        let cancelled = repo.cancel_request(&colleague, &second.id).await.unwrap();
        assert_eq!(cancelled.status, PermissionRequestStatus::Cancelled);

        let mine = repo
            .list_permission_requests(&colleague, None, None)
            .await
            .unwrap();
        assert_eq!(mine.len(), 2);
    }

    #[tokio::test]
    async fn test_global_search_splits_limit_and_hides_private() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        seed_book(&services, &staff, "River Atlas", "9780306406157", 1).await;
        seed_book(&services, &staff, "River Ecology", "0306406152", 1).await;
        upload(&services, &staff, "River Basins", AccessLevel::Open).await;
        upload(&services, &staff, "River Secrets", AccessLevel::Private).await;

        let repo = &services.repository;
        assert_eq!(repo.global_search(None, "r", 10).await.unwrap().total(), 0);

        let results = repo.global_search(None, "river", 2).await.unwrap();
        assert_eq!(results.books.len(), 1);
        assert_eq!(results.ebooks.len(), 1);

        let results = repo.global_search(None, "river", 10).await.unwrap();
        assert_eq!(results.books.len(), 2);
        assert_eq!(results.ebooks.len(), 1);
        assert_eq!(results.ebooks[0].title, "River Basins");

        let since = chrono::Utc::now() - chrono::Duration::hours(1);
        let until = chrono::Utc::now() + chrono::Duration::hours(1);
        let searches = db
            .analytics()
            .count_events(EventType::Search, since, until)
            .await
            .unwrap();
        assert_eq!(searches, 2);
    }

    #[tokio::test]
    async fn test_suggestions_are_capped() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let isbns = ["9780306406157", "0306406152", "9781861972712", "0198526636", "9780198526636", "1861972717"];
        for (i, isbn) in isbns.iter().enumerate() {
            seed_book(&services, &staff, &format!("Ocean {}", i), isbn, 0).await;
        }
        for i in 0..3 {
            upload(&services, &staff, &format!("Ocean paper {}", i), AccessLevel::Open).await;
        }

        let suggestions = services.repository.search_suggestions(None, "ocean").await.unwrap();
        assert_eq!(suggestions.len(), MAX_SUGGESTIONS);
        assert_eq!(
            suggestions.iter().filter(|s| s.kind == SuggestionKind::Book).count(),
            5
        );
        assert_eq!(
            suggestions.iter().filter(|s| s.kind == SuggestionKind::Author).count(),
            5
        );
    }
}
