use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use librarium_audit::AuditRecorder;
use librarium_identity::AuthenticatedUser;
use librarium_model::{
    Book, BookFilter, BookHistory, BookPatch, HistoryAction, HistoryFilter, NewBook,
    NewHistoryEntry, UserRole,
};
use librarium_repo::{
    Books, Catalogue, History, HistoryNoUpdate, HistoryRepository, Page, RepoError, Repository,
    UnitOfWork,
};
use librarium_repo_memory::{MemoryCatalogue, MemoryUow};

fn editor() -> AuthenticatedUser {
    AuthenticatedUser {
        user_id: Uuid::new_v4(),
        username: "editor".to_owned(),
        roles: vec![UserRole::Editor],
    }
}

fn dune() -> NewBook {
    NewBook {
        title: "Dune".to_owned(),
        description: None,
        author_id: None,
        genre_id: None,
        year: 1965,
        is_published: true,
    }
}

#[tokio::test]
async fn lifecycle_leaves_a_complete_trail() {
    let catalogue = MemoryCatalogue::new();
    let identity = editor();
    let recorder = AuditRecorder::for_identity(&identity);

    let mut uow = catalogue.begin().await.unwrap();
    let book = recorder.create_book(&mut uow, dune()).await.unwrap();
    let updated = recorder
        .update_book(
            &mut uow,
            book.id,
            BookPatch {
                year: Some(1966),
                ..BookPatch::default()
            },
        )
        .await
        .unwrap()
        .expect("book exists");
    assert_eq!(updated.year, 1966);
    assert!(recorder.delete_book(&mut uow, book.id).await.unwrap());
    uow.commit().await.unwrap();

    let mut uow = catalogue.begin().await.unwrap();
    let gone = Repository::<Books>::get_by_id(&mut uow, book.id)
        .await
        .unwrap();
    assert!(gone.is_none());

    // Newest first; the trail outlives the book.
    let trail = uow.get_by_book(book.id).await.unwrap();
    assert_eq!(trail.len(), 3);
    assert_eq!(trail[0].action, HistoryAction::Delete);
    assert_eq!(trail[1].action, HistoryAction::Update);
    assert_eq!(trail[2].action, HistoryAction::Create);
    assert!(trail.iter().all(|row| row.user_id == identity.user_id));

    let create = &trail[2];
    assert!(create.old_values.is_none());
    let created = create.new_values.as_ref().unwrap();
    assert_eq!(created.get("title"), Some(&Value::from("Dune")));
    assert_eq!(created.get("year"), Some(&Value::from(1965)));

    let update = &trail[1];
    let old = update.old_values.as_ref().unwrap();
    let new = update.new_values.as_ref().unwrap();
    assert_eq!(old.len(), 1);
    assert_eq!(old.get("year"), Some(&Value::from(1965)));
    assert_eq!(new.get("year"), Some(&Value::from(1966)));

    let delete = &trail[0];
    assert!(delete.new_values.is_none());
    let last = delete.old_values.as_ref().unwrap();
    assert_eq!(last.get("year"), Some(&Value::from(1966)));
    assert_eq!(last.get("title"), Some(&Value::from("Dune")));
}

#[tokio::test]
async fn absent_book_records_nothing() {
    let catalogue = MemoryCatalogue::new();
    let recorder = AuditRecorder::new(Uuid::new_v4());
    let missing = Uuid::new_v4();

    let mut uow = catalogue.begin().await.unwrap();
    let patched = recorder
        .update_book(
            &mut uow,
            missing,
            BookPatch {
                year: Some(2000),
                ..BookPatch::default()
            },
        )
        .await
        .unwrap();
    assert!(patched.is_none());
    assert!(!recorder.delete_book(&mut uow, missing).await.unwrap());

    let trail = Repository::<History>::list(&mut uow, &HistoryFilter::default(), &Page::default())
        .await
        .unwrap();
    assert!(trail.is_empty());
}

#[tokio::test]
async fn noop_patch_records_nothing() {
    let catalogue = MemoryCatalogue::new();
    let recorder = AuditRecorder::new(Uuid::new_v4());

    let mut uow = catalogue.begin().await.unwrap();
    let book = recorder.create_book(&mut uow, dune()).await.unwrap();

    // Empty patch, then a patch that rewrites the current value.
    let unchanged = recorder
        .update_book(&mut uow, book.id, BookPatch::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged, book);
    recorder
        .update_book(
            &mut uow,
            book.id,
            BookPatch {
                year: Some(1965),
                ..BookPatch::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    let trail = uow.get_by_book(book.id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].action, HistoryAction::Create);
}

/// Delegates book access but refuses history writes, standing in for a
/// backend whose history table is down mid-transaction.
struct FailingHistory {
    inner: MemoryUow,
}

#[async_trait]
impl Repository<Books> for FailingHistory {
    async fn create(&mut self, data: NewBook) -> Result<Book, RepoError> {
        Repository::<Books>::create(&mut self.inner, data).await
    }

    async fn get_by_id(&mut self, id: Uuid) -> Result<Option<Book>, RepoError> {
        Repository::<Books>::get_by_id(&mut self.inner, id).await
    }

    async fn update(&mut self, id: Uuid, patch: BookPatch) -> Result<Option<Book>, RepoError> {
        Repository::<Books>::update(&mut self.inner, id, patch).await
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool, RepoError> {
        Repository::<Books>::delete(&mut self.inner, id).await
    }

    async fn exists(&mut self, filter: &BookFilter) -> Result<bool, RepoError> {
        Repository::<Books>::exists(&mut self.inner, filter).await
    }

    async fn list(&mut self, filter: &BookFilter, page: &Page) -> Result<Vec<Book>, RepoError> {
        Repository::<Books>::list(&mut self.inner, filter, page).await
    }
}

#[async_trait]
impl Repository<History> for FailingHistory {
    async fn create(&mut self, _data: NewHistoryEntry) -> Result<BookHistory, RepoError> {
        Err(RepoError::Unavailable("history table is down".to_owned()))
    }

    async fn get_by_id(&mut self, id: Uuid) -> Result<Option<BookHistory>, RepoError> {
        Repository::<History>::get_by_id(&mut self.inner, id).await
    }

    async fn update(
        &mut self,
        id: Uuid,
        patch: HistoryNoUpdate,
    ) -> Result<Option<BookHistory>, RepoError> {
        Repository::<History>::update(&mut self.inner, id, patch).await
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool, RepoError> {
        Repository::<History>::delete(&mut self.inner, id).await
    }

    async fn exists(&mut self, filter: &HistoryFilter) -> Result<bool, RepoError> {
        Repository::<History>::exists(&mut self.inner, filter).await
    }

    async fn list(
        &mut self,
        filter: &HistoryFilter,
        page: &Page,
    ) -> Result<Vec<BookHistory>, RepoError> {
        Repository::<History>::list(&mut self.inner, filter, page).await
    }
}

#[tokio::test]
async fn failed_history_write_rolls_the_mutation_back() {
    let catalogue = MemoryCatalogue::new();
    let recorder = AuditRecorder::new(Uuid::new_v4());

    let mut faulty = FailingHistory {
        inner: catalogue.begin().await.unwrap(),
    };
    let err = recorder.create_book(&mut faulty, dune()).await.unwrap_err();
    assert!(matches!(err, RepoError::Unavailable(_)));
    faulty.inner.rollback().await.unwrap();

    let mut uow = catalogue.begin().await.unwrap();
    let books = Repository::<Books>::list(&mut uow, &BookFilter::default(), &Page::default())
        .await
        .unwrap();
    assert!(books.is_empty());
}
