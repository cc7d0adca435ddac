//! Catalog: taxonomy, books and physical copies

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::db::{
    AuthorRecord, BookCopyRecord, BookFilter, BookRecord, CopyCondition, CopyStatus, CreateAnalyticsEvent,
    CreateBook, CreateBookCopy, Database, DepartmentRecord, EventType, FacultyRecord, GenreRecord,
    ItemType, PublisherRecord, TopicRecord,
};

use super::analytics::AnalyticsService;
use super::rules;
use super::{Actor, ServiceError, ServiceResult};

const DEFAULT_LANGUAGE: &str = "English";

/// Book as submitted by staff; the ISBN is normalized and checked
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub isbn: String,
    pub author_ids: Vec<String>,
    pub publisher_id: String,
    pub faculty_id: Option<String>,
    pub department_id: Option<String>,
    pub topic_id: Option<String>,
    pub genre_id: Option<String>,
    pub description: String,
    pub publication_date: NaiveDate,
    pub edition: String,
    pub pages: i64,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BookAvailability {
    pub total_copies: i64,
    pub available_copies: i64,
    pub is_available: bool,
}

#[derive(Clone)]
pub struct CatalogService {
    db: Database,
    analytics: AnalyticsService,
}

impl CatalogService {
    pub fn new(db: Database, analytics: AnalyticsService) -> Self {
        Self { db, analytics }
    }

    // ========================================================================
    // Taxonomy
    // ========================================================================

    pub async fn create_author(&self, actor: &Actor, name: &str, bio: &str) -> ServiceResult<AuthorRecord> {
        actor.require_staff()?;
        let name = required(name, "Author name")?;
        Ok(self.db.catalog().create_author(name, bio.trim()).await?)
    }

    pub async fn create_publisher(
        &self,
        actor: &Actor,
        name: &str,
        address: &str,
        website: &str,
    ) -> ServiceResult<PublisherRecord> {
        actor.require_staff()?;
        let name = required(name, "Publisher name")?;
        Ok(self
            .db
            .catalog()
            .create_publisher(name, address.trim(), website.trim())
            .await?)
    }

    pub async fn create_faculty(
        &self,
        actor: &Actor,
        name: &str,
        code: &str,
        description: &str,
    ) -> ServiceResult<FacultyRecord> {
        actor.require_staff()?;
        let name = required(name, "Faculty name")?;
        let code = required(code, "Faculty code")?;
        Ok(self
            .db
            .catalog()
            .create_faculty(name, &code.to_uppercase(), description.trim())
            .await?)
    }

    pub async fn create_department(
        &self,
        actor: &Actor,
        name: &str,
        code: &str,
        description: &str,
        faculty_id: &str,
    ) -> ServiceResult<DepartmentRecord> {
        actor.require_staff()?;
        let name = required(name, "Department name")?;
        let code = required(code, "Department code")?;
        let catalog = self.db.catalog();
        if catalog.get_faculty(faculty_id).await?.is_none() {
            return Err(ServiceError::not_found("Faculty not found"));
        }
        Ok(catalog
            .create_department(name, &code.to_uppercase(), description.trim(), faculty_id)
            .await?)
    }

    pub async fn create_topic(
        &self,
        actor: &Actor,
        name: &str,
        code: &str,
        description: &str,
        department_id: &str,
    ) -> ServiceResult<TopicRecord> {
        actor.require_staff()?;
        let name = required(name, "Topic name")?;
        let code = required(code, "Topic code")?;
        let catalog = self.db.catalog();
        if catalog.get_department(department_id).await?.is_none() {
            return Err(ServiceError::not_found("Department not found"));
        }
        Ok(catalog
            .create_topic(name, &code.to_uppercase(), description.trim(), department_id)
            .await?)
    }

    pub async fn create_genre(&self, actor: &Actor, name: &str, description: &str) -> ServiceResult<GenreRecord> {
        actor.require_staff()?;
        let name = required(name, "Genre name")?;
        Ok(self.db.catalog().create_genre(name, description.trim()).await?)
    }

    pub async fn list_authors(&self) -> ServiceResult<Vec<AuthorRecord>> {
        Ok(self.db.catalog().list_authors().await?)
    }

    pub async fn list_publishers(&self) -> ServiceResult<Vec<PublisherRecord>> {
        Ok(self.db.catalog().list_publishers().await?)
    }

    pub async fn list_faculties(&self) -> ServiceResult<Vec<FacultyRecord>> {
        Ok(self.db.catalog().list_faculties().await?)
    }

    pub async fn list_departments(&self, faculty_id: Option<&str>) -> ServiceResult<Vec<DepartmentRecord>> {
        Ok(self.db.catalog().list_departments(faculty_id).await?)
    }

    pub async fn list_topics(&self, department_id: Option<&str>) -> ServiceResult<Vec<TopicRecord>> {
        Ok(self.db.catalog().list_topics(department_id).await?)
    }

    pub async fn list_genres(&self) -> ServiceResult<Vec<GenreRecord>> {
        Ok(self.db.catalog().list_genres().await?)
    }

    pub async fn get_publisher(&self, id: &str) -> ServiceResult<Option<PublisherRecord>> {
        Ok(self.db.catalog().get_publisher(id).await?)
    }

    pub async fn get_genre(&self, id: &str) -> ServiceResult<Option<GenreRecord>> {
        Ok(self.db.catalog().get_genre(id).await?)
    }

    // ========================================================================
    // Books
    // ========================================================================

    pub async fn create_book(&self, actor: &Actor, book: NewBook) -> ServiceResult<BookRecord> {
        actor.require_staff()?;
        let catalog = self.db.catalog();

        let title = required(&book.title, "Title")?.to_string();
        let isbn = rules::normalize_isbn(&book.isbn).map_err(ServiceError::Validation)?;
        if book.pages < 0 {
            return Err(ServiceError::validation("Pages cannot be negative"));
        }
        if book.author_ids.is_empty() {
            return Err(ServiceError::validation("A book needs at least one author"));
        }
        if catalog.get_book_by_isbn(&isbn).await?.is_some() {
            return Err(ServiceError::conflict("A book with this ISBN already exists"));
        }
        if catalog.get_publisher(&book.publisher_id).await?.is_none() {
            return Err(ServiceError::not_found("Publisher not found"));
        }
        for author_id in &book.author_ids {
            if catalog.get_author(author_id).await?.is_none() {
                return Err(ServiceError::not_found(format!("Author {} not found", author_id)));
            }
        }

        let language = book
            .language
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        let created = catalog
            .create_book(CreateBook {
                title,
                isbn,
                author_ids: book.author_ids,
                publisher_id: book.publisher_id,
                faculty_id: book.faculty_id,
                department_id: book.department_id,
                topic_id: book.topic_id,
                genre_id: book.genre_id,
                description: book.description.trim().to_string(),
                publication_date: book.publication_date,
                edition: book.edition.trim().to_string(),
                pages: book.pages,
                language,
            })
            .await?;

        info!(book_id = %created.id, isbn = %created.isbn, "Book created");
        Ok(created)
    }

    pub async fn get_book(&self, id: &str) -> ServiceResult<BookRecord> {
        self.db
            .catalog()
            .get_book(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Book not found"))
    }

    /// Fetch a book for display, counting the view
    pub async fn view_book(&self, actor: Option<&Actor>, id: &str) -> ServiceResult<BookRecord> {
        let book = self.get_book(id).await?;

        let mut event =
            CreateAnalyticsEvent::new(EventType::BookView, actor.map(|a| a.user_id.as_str()));
        event.book_id = Some(book.id.clone());
        self.analytics.record(event).await;
        self.analytics.bump(ItemType::Book, &book.id, 1, 0, 0).await;

        Ok(book)
    }

    pub async fn book_authors(&self, book_id: &str) -> ServiceResult<Vec<AuthorRecord>> {
        Ok(self.db.catalog().book_authors(book_id).await?)
    }

    pub async fn availability(&self, book_id: &str) -> ServiceResult<BookAvailability> {
        let (total, available) = self.db.catalog().copy_counts(book_id).await?;
        Ok(BookAvailability {
            total_copies: total,
            available_copies: available,
            is_available: available > 0,
        })
    }

    /// One page of matching books plus the total match count
    pub async fn search_books(
        &self,
        filter: &BookFilter,
        limit: i64,
        offset: i64,
    ) -> ServiceResult<(Vec<BookRecord>, i64)> {
        Ok(self
            .db
            .catalog()
            .search_books(filter, limit.clamp(1, 100), offset.max(0))
            .await?)
    }

    // ========================================================================
    // Copies
    // ========================================================================

    pub async fn create_copy(&self, actor: &Actor, mut copy: CreateBookCopy) -> ServiceResult<BookCopyRecord> {
        actor.require_staff()?;
        copy.barcode = required(&copy.barcode, "Barcode")?.to_string();

        let catalog = self.db.catalog();
        if catalog.get_book(&copy.book_id).await?.is_none() {
            return Err(ServiceError::not_found("Book not found"));
        }
        if catalog.get_copy_by_barcode(&copy.barcode).await?.is_some() {
            return Err(ServiceError::conflict("A copy with this barcode already exists"));
        }

        let created = catalog.create_copy(copy).await?;
        info!(copy_id = %created.id, book_id = %created.book_id, "Book copy added");
        Ok(created)
    }

    pub async fn get_copy(&self, id: &str) -> ServiceResult<BookCopyRecord> {
        self.db
            .catalog()
            .get_copy(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Book copy not found"))
    }

    pub async fn copies_for_book(&self, book_id: &str) -> ServiceResult<Vec<BookCopyRecord>> {
        Ok(self.db.catalog().copies_for_book(book_id).await?)
    }

    /// Manual status change. Loans own the checked-out state, so it can be
    /// neither set nor cleared here.
    pub async fn set_copy_status(
        &self,
        actor: &Actor,
        copy_id: &str,
        status: CopyStatus,
    ) -> ServiceResult<BookCopyRecord> {
        actor.require_staff()?;
        let copy = self.get_copy(copy_id).await?;
        if status == CopyStatus::CheckedOut {
            return Err(ServiceError::validation("Copies are checked out through loans"));
        }
        if copy.status == CopyStatus::CheckedOut {
            return Err(ServiceError::invalid_state(
                "Copy is on loan; return it or mark the loan lost",
            ));
        }

        self.db.catalog().set_copy_status(copy_id, status).await?;
        info!(copy_id = %copy_id, status = ?status, "Copy status changed");
        self.get_copy(copy_id).await
    }

    pub async fn set_copy_condition(
        &self,
        actor: &Actor,
        copy_id: &str,
        condition: CopyCondition,
    ) -> ServiceResult<BookCopyRecord> {
        actor.require_staff()?;
        if !self.db.catalog().set_copy_condition(copy_id, condition).await? {
            return Err(ServiceError::not_found("Book copy not found"));
        }
        self.get_copy(copy_id).await
    }
}

fn required<'a>(value: &'a str, field: &str) -> ServiceResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::validation(format!("{} is required", field)));
    }
    Ok(value)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::MembershipType;
    use crate::services::Services;
    use crate::services::test_support::{member_actor, staff_actor, test_db, test_services};
    use assert_matches::assert_matches;

    /// A book with `copies` available copies, created by `staff`
    pub async fn seed_book(
        services: &Services,
        staff: &Actor,
        title: &str,
        isbn: &str,
        copies: usize,
    ) -> (BookRecord, Vec<BookCopyRecord>) {
        let catalog = &services.catalog;
        let author = catalog.create_author(staff, &format!("{} Author", title), "").await.unwrap();
        let publisher = catalog
            .create_publisher(staff, &format!("{} Press", title), "", "")
            .await
            .unwrap();
        let book = catalog
            .create_book(
                staff,
                NewBook {
                    title: title.to_string(),
                    isbn: isbn.to_string(),
                    author_ids: vec![author.id],
                    publisher_id: publisher.id,
                    faculty_id: None,
                    department_id: None,
                    topic_id: None,
                    genre_id: None,
                    description: format!("All about {}", title),
                    publication_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                    edition: "1st".into(),
                    pages: 300,
                    language: None,
                },
            )
            .await
            .unwrap();

        let mut created = Vec::new();
        for i in 0..copies {
            created.push(
                catalog
                    .create_copy(
                        staff,
                        CreateBookCopy {
                            book_id: book.id.clone(),
                            barcode: format!("{}-{}", book.isbn, i),
                            condition: CopyCondition::Good,
                            acquisition_date: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
                            location: "Stacks A".into(),
                        },
                    )
                    .await
                    .unwrap(),
            );
        }
        (book, created)
    }

    #[tokio::test]
    async fn test_create_book_normalizes_isbn_and_defaults_language() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;

        let (book, _) = seed_book(&services, &staff, "Dune", "978-0-306-40615-7", 0).await;
        assert_eq!(book.isbn, "9780306406157");
        assert_eq!(book.language, "English");
        assert_eq!(services.catalog.book_authors(&book.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_isbn_and_bad_isbn() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let (book, _) = seed_book(&services, &staff, "Dune", "9780306406157", 0).await;

        let authors = services.catalog.book_authors(&book.id).await.unwrap();
        let mut again = NewBook {
            title: "Dune II".into(),
            isbn: "978 0 306 40615 7".into(),
            author_ids: vec![authors[0].id.clone()],
            publisher_id: book.publisher_id.clone(),
            faculty_id: None,
            department_id: None,
            topic_id: None,
            genre_id: None,
            description: String::new(),
            publication_date: book.publication_date,
            edition: String::new(),
            pages: 10,
            language: Some("French".into()),
        };
        assert_matches!(
            services.catalog.create_book(&staff, again.clone()).await,
            Err(ServiceError::Conflict(_))
        );

        again.isbn = "9780306406158".into();
        assert_matches!(
            services.catalog.create_book(&staff, again).await,
            Err(ServiceError::Validation(_))
        );
    }

    #[tokio::test]
    async fn test_availability_and_search() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let (book, copies) = seed_book(&services, &staff, "Dune", "9780306406157", 2).await;
        seed_book(&services, &staff, "Emma", "0306406152", 0).await;

        let availability = services.catalog.availability(&book.id).await.unwrap();
        assert_eq!(availability.total_copies, 2);
        assert!(availability.is_available);

        let filter = BookFilter {
            query: Some("dune author".into()),
            ..Default::default()
        };
        let (hits, total) = services.catalog.search_books(&filter, 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(hits[0].id, book.id);

        services
            .catalog
            .set_copy_status(&staff, &copies[0].id, CopyStatus::Damaged)
            .await
            .unwrap();
        services
            .catalog
            .set_copy_status(&staff, &copies[1].id, CopyStatus::Lost)
            .await
            .unwrap();
        let available_only = BookFilter {
            available_only: true,
            ..Default::default()
        };
        let (hits, _) = services.catalog.search_books(&available_only, 10, 0).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_view_book_counts_popularity() {
        let db = test_db().await;
        let services = test_services(&db);
        let staff = staff_actor(&db, "sam").await;
        let patron = member_actor(&db, "pat", MembershipType::Student).await;
        let (book, _) = seed_book(&services, &staff, "Dune", "9780306406157", 1).await;

        services.catalog.view_book(Some(&patron), &book.id).await.unwrap();
        services.catalog.view_book(None, &book.id).await.unwrap();

        let item = db
            .analytics()
            .get_popularity(ItemType::Book, &book.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.view_count, 2);
        assert_eq!(item.total_score, 2);
    }

    #[tokio::test]
    async fn test_patrons_cannot_edit_catalog() {
        let db = test_db().await;
        let services = test_services(&db);
        let patron = member_actor(&db, "pat", MembershipType::Student).await;
        assert_matches!(
            services.catalog.create_genre(&patron, "Poetry", "").await,
            Err(ServiceError::Forbidden(_))
        );
    }
}
