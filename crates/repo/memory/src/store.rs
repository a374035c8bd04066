use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use librarium_model::{
    Author, AuthorFilter, AuthorPatch, Book, BookFile, BookFileFilter, BookFilePatch, BookFilter,
    BookHistory, BookPatch, Genre, GenreFilter, GenrePatch, HistoryFilter, NewAuthor, NewBook,
    NewBookFile, NewGenre, NewHistoryEntry, NewUser, User, UserFilter, UserPatch,
};
use librarium_repo::{
    Authors, BookFiles, Books, Catalogue, Genres, History, HistoryNoUpdate, Page, RepoError,
    Repository, UnitOfWork, Users, compile,
};

use crate::eval;

/// The whole row set, one map per entity keyed by id.
#[derive(Debug, Clone, Default)]
struct Tables {
    authors: BTreeMap<Uuid, Author>,
    genres: BTreeMap<Uuid, Genre>,
    books: BTreeMap<Uuid, Book>,
    book_files: BTreeMap<Uuid, BookFile>,
    users: BTreeMap<Uuid, User>,
    history: BTreeMap<Uuid, BookHistory>,
}

/// In-memory [`Catalogue`] with real transactional semantics. Suitable for
/// development and testing.
///
/// `begin` takes the table lock and clones a staging copy; commit writes
/// the staging copy back, rollback (or drop) discards it. Holding the lock
/// for the lifetime of the unit of work serializes concurrent units, which
/// is stricter than any isolation level the relational backend provides.
#[derive(Debug, Default)]
pub struct MemoryCatalogue {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryCatalogue {
    /// Create a new, empty in-memory catalogue.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Catalogue for MemoryCatalogue {
    type Uow = MemoryUow;

    async fn begin(&self) -> Result<MemoryUow, RepoError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryUow { guard, staged })
    }
}

/// One unit of work over the in-memory tables.
pub struct MemoryUow {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

#[async_trait]
impl UnitOfWork for MemoryUow {
    async fn commit(self) -> Result<(), RepoError> {
        let MemoryUow { mut guard, staged } = self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self) -> Result<(), RepoError> {
        Ok(())
    }
}

fn constraint(message: impl Into<String>) -> RepoError {
    RepoError::Constraint(message.into())
}

impl MemoryUow {
    fn author_name_taken(&self, name: &str, except: Option<Uuid>) -> bool {
        self.staged
            .authors
            .values()
            .any(|a| a.name == name && Some(a.id) != except)
    }

    fn genre_name_taken(&self, name: &str, except: Option<Uuid>) -> bool {
        self.staged
            .genres
            .values()
            .any(|g| g.name == name && Some(g.id) != except)
    }

    fn storage_key_taken(&self, key: &str) -> bool {
        self.staged
            .book_files
            .values()
            .any(|f| f.storage_key == key)
    }

    fn username_taken(&self, username: &str, except: Option<Uuid>) -> bool {
        self.staged
            .users
            .values()
            .any(|u| u.username == username && Some(u.id) != except)
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.staged
            .users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }

    /// Referential checks the relational backend gets from its foreign
    /// keys; mirrored here so both backends fail identically.
    fn check_book_refs(
        &self,
        author_id: Option<Uuid>,
        genre_id: Option<Uuid>,
    ) -> Result<(), RepoError> {
        if let Some(author_id) = author_id {
            if !self.staged.authors.contains_key(&author_id) {
                return Err(constraint(format!("author {author_id} does not exist")));
            }
        }
        if let Some(genre_id) = genre_id {
            if !self.staged.genres.contains_key(&genre_id) {
                return Err(constraint(format!("genre {genre_id} does not exist")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Repository<Authors> for MemoryUow {
    async fn create(&mut self, data: NewAuthor) -> Result<Author, RepoError> {
        data.validate()?;
        if self.author_name_taken(&data.name, None) {
            return Err(constraint(format!("author name `{}` is taken", data.name)));
        }
        let row = Author {
            id: Uuid::new_v4(),
            name: data.name,
            bio: data.bio,
        };
        self.staged.authors.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_by_id(&mut self, id: Uuid) -> Result<Option<Author>, RepoError> {
        Ok(self.staged.authors.get(&id).cloned())
    }

    async fn update(&mut self, id: Uuid, patch: AuthorPatch) -> Result<Option<Author>, RepoError> {
        patch.validate()?;
        // An absent row wins over any constraint breach the patch carries,
        // matching what UPDATE .. WHERE id does relationally.
        if !self.staged.authors.contains_key(&id) {
            return Ok(None);
        }
        if let Some(name) = &patch.name {
            if self.author_name_taken(name, Some(id)) {
                return Err(constraint(format!("author name `{name}` is taken")));
            }
        }
        let Some(row) = self.staged.authors.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            row.name = name;
        }
        if let Some(bio) = patch.bio {
            row.bio = Some(bio);
        }
        Ok(Some(row.clone()))
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool, RepoError> {
        if self.staged.books.values().any(|b| b.author_id == Some(id)) {
            return Err(constraint(format!("author {id} still has books")));
        }
        Ok(self.staged.authors.remove(&id).is_some())
    }

    async fn exists(&mut self, filter: &AuthorFilter) -> Result<bool, RepoError> {
        let query = compile::<Authors>(filter, &Page::single())?;
        Ok(self
            .staged
            .authors
            .values()
            .any(|row| eval::matches(row, &query.predicates)))
    }

    async fn list(
        &mut self,
        filter: &AuthorFilter,
        page: &Page,
    ) -> Result<Vec<Author>, RepoError> {
        let query = compile::<Authors>(filter, page)?;
        Ok(eval::select(self.staged.authors.values().cloned(), &query))
    }
}

#[async_trait]
impl Repository<Genres> for MemoryUow {
    async fn create(&mut self, data: NewGenre) -> Result<Genre, RepoError> {
        data.validate()?;
        if self.genre_name_taken(&data.name, None) {
            return Err(constraint(format!("genre name `{}` is taken", data.name)));
        }
        let row = Genre {
            id: Uuid::new_v4(),
            name: data.name,
            description: data.description,
        };
        self.staged.genres.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_by_id(&mut self, id: Uuid) -> Result<Option<Genre>, RepoError> {
        Ok(self.staged.genres.get(&id).cloned())
    }

    async fn update(&mut self, id: Uuid, patch: GenrePatch) -> Result<Option<Genre>, RepoError> {
        patch.validate()?;
        if !self.staged.genres.contains_key(&id) {
            return Ok(None);
        }
        if let Some(name) = &patch.name {
            if self.genre_name_taken(name, Some(id)) {
                return Err(constraint(format!("genre name `{name}` is taken")));
            }
        }
        let Some(row) = self.staged.genres.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            row.name = name;
        }
        if let Some(description) = patch.description {
            row.description = Some(description);
        }
        Ok(Some(row.clone()))
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool, RepoError> {
        if self.staged.books.values().any(|b| b.genre_id == Some(id)) {
            return Err(constraint(format!("genre {id} still has books")));
        }
        Ok(self.staged.genres.remove(&id).is_some())
    }

    async fn exists(&mut self, filter: &GenreFilter) -> Result<bool, RepoError> {
        let query = compile::<Genres>(filter, &Page::single())?;
        Ok(self
            .staged
            .genres
            .values()
            .any(|row| eval::matches(row, &query.predicates)))
    }

    async fn list(&mut self, filter: &GenreFilter, page: &Page) -> Result<Vec<Genre>, RepoError> {
        let query = compile::<Genres>(filter, page)?;
        Ok(eval::select(self.staged.genres.values().cloned(), &query))
    }
}

#[async_trait]
impl Repository<Books> for MemoryUow {
    async fn create(&mut self, data: NewBook) -> Result<Book, RepoError> {
        data.validate()?;
        self.check_book_refs(data.author_id, data.genre_id)?;
        let row = Book {
            id: Uuid::new_v4(),
            title: data.title,
            description: data.description,
            author_id: data.author_id,
            genre_id: data.genre_id,
            year: data.year,
            is_published: data.is_published,
            created_at: Utc::now(),
        };
        self.staged.books.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_by_id(&mut self, id: Uuid) -> Result<Option<Book>, RepoError> {
        Ok(self.staged.books.get(&id).cloned())
    }

    async fn update(&mut self, id: Uuid, patch: BookPatch) -> Result<Option<Book>, RepoError> {
        patch.validate()?;
        if !self.staged.books.contains_key(&id) {
            return Ok(None);
        }
        self.check_book_refs(patch.author_id, patch.genre_id)?;
        let Some(row) = self.staged.books.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(title) = patch.title {
            row.title = title;
        }
        if let Some(description) = patch.description {
            row.description = Some(description);
        }
        if let Some(author_id) = patch.author_id {
            row.author_id = Some(author_id);
        }
        if let Some(genre_id) = patch.genre_id {
            row.genre_id = Some(genre_id);
        }
        if let Some(year) = patch.year {
            row.year = year;
        }
        if let Some(is_published) = patch.is_published {
            row.is_published = is_published;
        }
        Ok(Some(row.clone()))
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool, RepoError> {
        if self.staged.book_files.values().any(|f| f.book_id == id) {
            return Err(constraint(format!("book {id} still has files attached")));
        }
        Ok(self.staged.books.remove(&id).is_some())
    }

    async fn exists(&mut self, filter: &BookFilter) -> Result<bool, RepoError> {
        let query = compile::<Books>(filter, &Page::single())?;
        Ok(self
            .staged
            .books
            .values()
            .any(|row| eval::matches(row, &query.predicates)))
    }

    async fn list(&mut self, filter: &BookFilter, page: &Page) -> Result<Vec<Book>, RepoError> {
        let query = compile::<Books>(filter, page)?;
        Ok(eval::select(self.staged.books.values().cloned(), &query))
    }
}

#[async_trait]
impl Repository<BookFiles> for MemoryUow {
    async fn create(&mut self, data: NewBookFile) -> Result<BookFile, RepoError> {
        data.validate()?;
        if !self.staged.books.contains_key(&data.book_id) {
            return Err(constraint(format!("book {} does not exist", data.book_id)));
        }
        if self.storage_key_taken(&data.storage_key) {
            return Err(constraint(format!(
                "storage key `{}` is taken",
                data.storage_key
            )));
        }
        let row = BookFile {
            id: Uuid::new_v4(),
            book_id: data.book_id,
            storage_key: data.storage_key,
            file_type: data.file_type,
            original_name: data.original_name,
            size_bytes: data.size_bytes,
            mime_type: data.mime_type,
            created_at: Utc::now(),
        };
        self.staged.book_files.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_by_id(&mut self, id: Uuid) -> Result<Option<BookFile>, RepoError> {
        Ok(self.staged.book_files.get(&id).cloned())
    }

    async fn update(
        &mut self,
        id: Uuid,
        patch: BookFilePatch,
    ) -> Result<Option<BookFile>, RepoError> {
        patch.validate()?;
        let Some(row) = self.staged.book_files.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(original_name) = patch.original_name {
            row.original_name = original_name;
        }
        if let Some(mime_type) = patch.mime_type {
            row.mime_type = mime_type;
        }
        Ok(Some(row.clone()))
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool, RepoError> {
        Ok(self.staged.book_files.remove(&id).is_some())
    }

    async fn exists(&mut self, filter: &BookFileFilter) -> Result<bool, RepoError> {
        let query = compile::<BookFiles>(filter, &Page::single())?;
        Ok(self
            .staged
            .book_files
            .values()
            .any(|row| eval::matches(row, &query.predicates)))
    }

    async fn list(
        &mut self,
        filter: &BookFileFilter,
        page: &Page,
    ) -> Result<Vec<BookFile>, RepoError> {
        let query = compile::<BookFiles>(filter, page)?;
        Ok(eval::select(
            self.staged.book_files.values().cloned(),
            &query,
        ))
    }
}

#[async_trait]
impl Repository<Users> for MemoryUow {
    async fn create(&mut self, data: NewUser) -> Result<User, RepoError> {
        data.validate()?;
        if self.username_taken(&data.username, None) {
            return Err(constraint(format!("username `{}` is taken", data.username)));
        }
        if self.email_taken(&data.email, None) {
            return Err(constraint(format!("email `{}` is taken", data.email)));
        }
        let row = User {
            id: Uuid::new_v4(),
            username: data.username,
            email: data.email,
            hashed_password: data.hashed_password,
            full_name: data.full_name,
            roles: data.roles,
            is_active: data.is_active,
        };
        self.staged.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_by_id(&mut self, id: Uuid) -> Result<Option<User>, RepoError> {
        Ok(self.staged.users.get(&id).cloned())
    }

    async fn update(&mut self, id: Uuid, patch: UserPatch) -> Result<Option<User>, RepoError> {
        patch.validate()?;
        if !self.staged.users.contains_key(&id) {
            return Ok(None);
        }
        if let Some(username) = &patch.username {
            if self.username_taken(username, Some(id)) {
                return Err(constraint(format!("username `{username}` is taken")));
            }
        }
        if let Some(email) = &patch.email {
            if self.email_taken(email, Some(id)) {
                return Err(constraint(format!("email `{email}` is taken")));
            }
        }
        let Some(row) = self.staged.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(username) = patch.username {
            row.username = username;
        }
        if let Some(email) = patch.email {
            row.email = email;
        }
        if let Some(hashed_password) = patch.hashed_password {
            row.hashed_password = hashed_password;
        }
        if let Some(full_name) = patch.full_name {
            row.full_name = Some(full_name);
        }
        if let Some(roles) = patch.roles {
            row.roles = roles;
        }
        if let Some(is_active) = patch.is_active {
            row.is_active = is_active;
        }
        Ok(Some(row.clone()))
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool, RepoError> {
        Ok(self.staged.users.remove(&id).is_some())
    }

    async fn exists(&mut self, filter: &UserFilter) -> Result<bool, RepoError> {
        let query = compile::<Users>(filter, &Page::single())?;
        Ok(self
            .staged
            .users
            .values()
            .any(|row| eval::matches(row, &query.predicates)))
    }

    async fn list(&mut self, filter: &UserFilter, page: &Page) -> Result<Vec<User>, RepoError> {
        let query = compile::<Users>(filter, page)?;
        Ok(eval::select(self.staged.users.values().cloned(), &query))
    }
}

#[async_trait]
impl Repository<History> for MemoryUow {
    async fn create(&mut self, data: NewHistoryEntry) -> Result<BookHistory, RepoError> {
        let row = BookHistory {
            id: Uuid::new_v4(),
            book_id: data.book_id,
            user_id: data.user_id,
            action: data.action,
            changed_at: Utc::now(),
            old_values: data.old_values,
            new_values: data.new_values,
        };
        self.staged.history.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_by_id(&mut self, id: Uuid) -> Result<Option<BookHistory>, RepoError> {
        Ok(self.staged.history.get(&id).cloned())
    }

    async fn update(
        &mut self,
        _id: Uuid,
        _patch: HistoryNoUpdate,
    ) -> Result<Option<BookHistory>, RepoError> {
        Err(constraint("book_history is append-only"))
    }

    async fn delete(&mut self, _id: Uuid) -> Result<bool, RepoError> {
        Err(constraint("book_history is append-only"))
    }

    async fn exists(&mut self, filter: &HistoryFilter) -> Result<bool, RepoError> {
        let query = compile::<History>(filter, &Page::single())?;
        Ok(self
            .staged
            .history
            .values()
            .any(|row| eval::matches(row, &query.predicates)))
    }

    async fn list(
        &mut self,
        filter: &HistoryFilter,
        page: &Page,
    ) -> Result<Vec<BookHistory>, RepoError> {
        let query = compile::<History>(filter, page)?;
        Ok(eval::select(self.staged.history.values().cloned(), &query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn catalogue_conformance() {
        let catalogue = MemoryCatalogue::new();
        librarium_repo::testing::run_repository_conformance_tests(&catalogue)
            .await
            .expect("conformance tests should pass");
    }

    #[tokio::test]
    async fn dangling_author_reference_is_rejected() {
        let catalogue = MemoryCatalogue::new();
        let mut uow = catalogue.begin().await.unwrap();
        let book = NewBook {
            title: "Orphaned".to_owned(),
            description: None,
            author_id: Some(Uuid::new_v4()),
            genre_id: None,
            year: 2001,
            is_published: false,
        };
        let err = Repository::<Books>::create(&mut uow, book).await.unwrap_err();
        assert!(matches!(err, RepoError::Constraint(_)));
    }

    #[tokio::test]
    async fn deleting_an_author_with_books_is_rejected() {
        let catalogue = MemoryCatalogue::new();
        let mut uow = catalogue.begin().await.unwrap();
        let author = Repository::<Authors>::create(
            &mut uow,
            NewAuthor {
                name: "Iain Banks".to_owned(),
                bio: None,
            },
        )
        .await
        .unwrap();
        Repository::<Books>::create(
            &mut uow,
            NewBook {
                title: "The Wasp Factory".to_owned(),
                description: None,
                author_id: Some(author.id),
                genre_id: None,
                year: 1984,
                is_published: true,
            },
        )
        .await
        .unwrap();

        let err = Repository::<Authors>::delete(&mut uow, author.id)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Constraint(_)));
    }

    #[tokio::test]
    async fn updating_an_absent_user_ignores_a_taken_username() {
        use librarium_model::UserRole;

        let catalogue = MemoryCatalogue::new();
        let mut uow = catalogue.begin().await.unwrap();
        let user = Repository::<Users>::create(
            &mut uow,
            NewUser {
                username: "lem".to_owned(),
                email: "lem@example.com".to_owned(),
                hashed_password: "argon2id$stub".to_owned(),
                full_name: None,
                roles: vec![UserRole::Editor],
                is_active: true,
            },
        )
        .await
        .unwrap();

        let patch = UserPatch {
            username: Some(user.username.clone()),
            ..UserPatch::default()
        };
        let updated = Repository::<Users>::update(&mut uow, Uuid::new_v4(), patch)
            .await
            .unwrap();
        assert!(updated.is_none());
    }

    #[tokio::test]
    async fn dropping_a_unit_of_work_rolls_back() {
        let catalogue = MemoryCatalogue::new();
        let author_id = {
            let mut uow = catalogue.begin().await.unwrap();
            let author = Repository::<Authors>::create(
                &mut uow,
                NewAuthor {
                    name: "M. John Harrison".to_owned(),
                    bio: None,
                },
            )
            .await
            .unwrap();
            author.id
            // uow dropped here without commit
        };

        let mut uow = catalogue.begin().await.unwrap();
        let fetched = Repository::<Authors>::get_by_id(&mut uow, author_id)
            .await
            .unwrap();
        assert!(fetched.is_none());
    }
}
