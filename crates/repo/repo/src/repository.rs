use async_trait::async_trait;
use uuid::Uuid;

use librarium_model::{
    Author, AuthorFilter, Book, BookFile, BookFileFilter, BookFilter, BookHistory, Genre,
    GenreFilter, HistoryFilter, User, UserFilter,
};

use crate::entity::{Authors, BookFiles, Books, Entity, Genres, History, Users};
use crate::error::RepoError;
use crate::query::Page;

/// The generic repository contract, one shape reused for every entity.
///
/// Absent rows are normal outcomes, not errors: `get_by_id` and `update`
/// return `Ok(None)` and `delete` returns `Ok(false)`. Implementations run
/// inside a caller-supplied unit of work and never open their own
/// transaction or retry internally.
#[async_trait]
pub trait Repository<E: Entity>: Send {
    /// Persist a new entity and return its persisted projection.
    ///
    /// Fails with [`RepoError::Constraint`] when a uniqueness or
    /// required-field invariant is breached.
    async fn create(&mut self, data: E::Create) -> Result<E::Response, RepoError>;

    /// Fetch one row by id.
    async fn get_by_id(&mut self, id: Uuid) -> Result<Option<E::Response>, RepoError>;

    /// Partially update a row: only fields present in the patch change.
    async fn update(&mut self, id: Uuid, patch: E::Update)
    -> Result<Option<E::Response>, RepoError>;

    /// Remove a row. Idempotent: repeated calls return `false`.
    async fn delete(&mut self, id: Uuid) -> Result<bool, RepoError>;

    /// Check whether any row matches the filter, without materializing it.
    async fn exists(&mut self, filter: &E::Filter) -> Result<bool, RepoError>;

    /// List rows matching the filter, ordered and paged by the compiled
    /// query. Never returns more than `page.limit` rows; a window past the
    /// end of the result set is an empty vector.
    async fn list(&mut self, filter: &E::Filter, page: &Page)
    -> Result<Vec<E::Response>, RepoError>;
}

/// One atomic transactional scope wrapping a logical operation.
///
/// The handle is exclusively owned: repository calls borrow it mutably, so
/// one unit of work can never be driven concurrently. Dropping a unit of
/// work without committing rolls it back.
#[async_trait]
pub trait UnitOfWork:
    Repository<Authors>
    + Repository<Genres>
    + Repository<Books>
    + Repository<BookFiles>
    + Repository<Users>
    + Repository<History>
    + Send
{
    /// Make every write in this unit of work visible atomically.
    async fn commit(self) -> Result<(), RepoError>;

    /// Discard every write in this unit of work.
    async fn rollback(self) -> Result<(), RepoError>;
}

/// Hands out units of work against one backing store.
#[async_trait]
pub trait Catalogue: Send + Sync {
    type Uow: UnitOfWork;

    async fn begin(&self) -> Result<Self::Uow, RepoError>;
}

/// Author lookups, expressed as fixed filter shorthands over `list`.
#[async_trait]
pub trait AuthorRepository: Repository<Authors> {
    /// Exact-name lookup.
    async fn get_by_name(&mut self, name: &str) -> Result<Option<Author>, RepoError> {
        let filter = AuthorFilter {
            name: Some(name.to_owned()),
            ..AuthorFilter::default()
        };
        Ok(self.list(&filter, &Page::single()).await?.into_iter().next())
    }

    /// Case-insensitive substring search in author biographies.
    async fn search_in_bio(&mut self, term: &str) -> Result<Vec<Author>, RepoError> {
        let filter = AuthorFilter {
            bio_contains: Some(term.to_owned()),
            ..AuthorFilter::default()
        };
        self.list(&filter, &Page::default()).await
    }
}

impl<T: Repository<Authors> + ?Sized> AuthorRepository for T {}

/// Genre lookups.
#[async_trait]
pub trait GenreRepository: Repository<Genres> {
    async fn get_by_name(&mut self, name: &str) -> Result<Option<Genre>, RepoError> {
        let filter = GenreFilter {
            name: Some(name.to_owned()),
            ..GenreFilter::default()
        };
        Ok(self.list(&filter, &Page::single()).await?.into_iter().next())
    }

    async fn search_in_description(&mut self, term: &str) -> Result<Vec<Genre>, RepoError> {
        let filter = GenreFilter {
            description_contains: Some(term.to_owned()),
            ..GenreFilter::default()
        };
        self.list(&filter, &Page::default()).await
    }
}

impl<T: Repository<Genres> + ?Sized> GenreRepository for T {}

/// Book lookups.
#[async_trait]
pub trait BookRepository: Repository<Books> {
    /// Exact-title lookup.
    async fn get_by_title(&mut self, title: &str) -> Result<Option<Book>, RepoError> {
        let filter = BookFilter {
            title: Some(title.to_owned()),
            ..BookFilter::default()
        };
        Ok(self.list(&filter, &Page::single()).await?.into_iter().next())
    }

    /// All books by one author.
    async fn get_by_author(&mut self, author_id: Uuid) -> Result<Vec<Book>, RepoError> {
        let filter = BookFilter {
            author_id: Some(author_id),
            ..BookFilter::default()
        };
        self.list(&filter, &Page::default()).await
    }
}

impl<T: Repository<Books> + ?Sized> BookRepository for T {}

/// Book-file lookups.
#[async_trait]
pub trait BookFileRepository: Repository<BookFiles> {
    /// Lookup by the globally unique blob key.
    async fn get_by_storage_key(&mut self, key: &str) -> Result<Option<BookFile>, RepoError> {
        let filter = BookFileFilter {
            storage_key: Some(key.to_owned()),
            ..BookFileFilter::default()
        };
        Ok(self.list(&filter, &Page::single()).await?.into_iter().next())
    }

    /// All files attached to one book.
    async fn get_by_book(&mut self, book_id: Uuid) -> Result<Vec<BookFile>, RepoError> {
        let filter = BookFileFilter {
            book_id: Some(book_id),
            ..BookFileFilter::default()
        };
        self.list(&filter, &Page::default()).await
    }
}

impl<T: Repository<BookFiles> + ?Sized> BookFileRepository for T {}

/// User lookups.
#[async_trait]
pub trait UserRepository: Repository<Users> {
    async fn get_by_username(&mut self, username: &str) -> Result<Option<User>, RepoError> {
        let filter = UserFilter {
            username: Some(username.to_owned()),
            ..UserFilter::default()
        };
        Ok(self.list(&filter, &Page::single()).await?.into_iter().next())
    }

    async fn get_by_email(&mut self, email: &str) -> Result<Option<User>, RepoError> {
        let filter = UserFilter {
            email: Some(email.to_owned()),
            ..UserFilter::default()
        };
        Ok(self.list(&filter, &Page::single()).await?.into_iter().next())
    }
}

impl<T: Repository<Users> + ?Sized> UserRepository for T {}

/// History lookups. History rows are written by the audit recorder and are
/// append-only thereafter.
#[async_trait]
pub trait HistoryRepository: Repository<History> {
    /// Full change history of one book, newest first.
    async fn get_by_book(&mut self, book_id: Uuid) -> Result<Vec<BookHistory>, RepoError> {
        let filter = HistoryFilter {
            book_id: Some(book_id),
            ..HistoryFilter::default()
        };
        self.list(&filter, &Page::default().ordered_by("changed_at.desc"))
            .await
    }

    /// All changes performed by one user, newest first.
    async fn get_by_user(&mut self, user_id: Uuid) -> Result<Vec<BookHistory>, RepoError> {
        let filter = HistoryFilter {
            user_id: Some(user_id),
            ..HistoryFilter::default()
        };
        self.list(&filter, &Page::default().ordered_by("changed_at.desc"))
            .await
    }
}

impl<T: Repository<History> + ?Sized> HistoryRepository for T {}
