use uuid::Uuid;

use librarium_model::{
    Author, AuthorFilter, AuthorPatch, Book, BookFile, BookFileFilter, BookFilePatch, BookFilter,
    BookHistory, BookPatch, Genre, GenreFilter, GenrePatch, HistoryFilter, NewAuthor, NewBook,
    NewBookFile, NewGenre, NewHistoryEntry, NewUser, User, UserFilter, UserPatch,
};

use crate::query::{Predicate, ScalarValue};

/// Compiles a sparse filter into its predicate conjunction.
pub trait EntityFilter: Send + Sync {
    fn predicates(&self) -> Vec<Predicate>;
}

/// Read a named scalar field off a persisted row.
///
/// Backends without a query engine of their own (the memory backend) use
/// this to evaluate compiled predicates and orderings; field names match the
/// relational column names.
pub trait FieldRead {
    fn field(&self, name: &str) -> Option<ScalarValue>;
}

/// Descriptor tying one entity to its input, filter and response types.
///
/// Each entity is a zero-sized marker; the repository contract is generic
/// over it. This replaces per-entity data-access classes with one engine
/// plus a strategy type per entity.
pub trait Entity: Send + Sync + 'static {
    /// Entity name used in diagnostics.
    const NAME: &'static str;
    /// Fields `order_by` may name. `id` is always accepted.
    const SORTABLE: &'static [&'static str];

    type Create: Send + Sync + 'static;
    type Update: Send + Sync + 'static;
    type Filter: EntityFilter + Default + Send + Sync + 'static;
    type Response: FieldRead + Clone + Send + Sync + 'static;

    fn id(row: &Self::Response) -> Uuid;
}

pub struct Authors;
pub struct Genres;
pub struct Books;
pub struct BookFiles;
pub struct Users;
pub struct History;

impl Entity for Authors {
    const NAME: &'static str = "author";
    const SORTABLE: &'static [&'static str] = &["name"];
    type Create = NewAuthor;
    type Update = AuthorPatch;
    type Filter = AuthorFilter;
    type Response = Author;

    fn id(row: &Author) -> Uuid {
        row.id
    }
}

impl Entity for Genres {
    const NAME: &'static str = "genre";
    const SORTABLE: &'static [&'static str] = &["name"];
    type Create = NewGenre;
    type Update = GenrePatch;
    type Filter = GenreFilter;
    type Response = Genre;

    fn id(row: &Genre) -> Uuid {
        row.id
    }
}

impl Entity for Books {
    const NAME: &'static str = "book";
    const SORTABLE: &'static [&'static str] = &["title", "year", "created_at"];
    type Create = NewBook;
    type Update = BookPatch;
    type Filter = BookFilter;
    type Response = Book;

    fn id(row: &Book) -> Uuid {
        row.id
    }
}

impl Entity for BookFiles {
    const NAME: &'static str = "book_file";
    const SORTABLE: &'static [&'static str] = &["original_name", "size_bytes", "created_at"];
    type Create = NewBookFile;
    type Update = BookFilePatch;
    type Filter = BookFileFilter;
    type Response = BookFile;

    fn id(row: &BookFile) -> Uuid {
        row.id
    }
}

impl Entity for Users {
    const NAME: &'static str = "user";
    const SORTABLE: &'static [&'static str] = &["username", "email"];
    type Create = NewUser;
    type Update = UserPatch;
    type Filter = UserFilter;
    type Response = User;

    fn id(row: &User) -> Uuid {
        row.id
    }
}

impl Entity for History {
    const NAME: &'static str = "book_history";
    const SORTABLE: &'static [&'static str] = &["changed_at"];
    type Create = NewHistoryEntry;
    type Update = HistoryNoUpdate;
    type Filter = HistoryFilter;
    type Response = BookHistory;

    fn id(row: &BookHistory) -> Uuid {
        row.id
    }
}

/// History rows are append-only; there is no meaningful patch type.
/// `Repository::<History>::update` always fails with a constraint violation.
#[derive(Debug, Clone, Default)]
pub struct HistoryNoUpdate;

impl EntityFilter for AuthorFilter {
    fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        if let Some(name) = &self.name {
            predicates.push(Predicate::Eq {
                field: "name",
                value: ScalarValue::Text(name.clone()),
            });
        }
        if let Some(needle) = &self.bio_contains {
            predicates.push(Predicate::Contains {
                field: "bio",
                needle: needle.clone(),
            });
        }
        predicates
    }
}

impl EntityFilter for GenreFilter {
    fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        if let Some(name) = &self.name {
            predicates.push(Predicate::Eq {
                field: "name",
                value: ScalarValue::Text(name.clone()),
            });
        }
        if let Some(needle) = &self.description_contains {
            predicates.push(Predicate::Contains {
                field: "description",
                needle: needle.clone(),
            });
        }
        predicates
    }
}

impl EntityFilter for BookFilter {
    fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        if let Some(title) = &self.title {
            predicates.push(Predicate::Eq {
                field: "title",
                value: ScalarValue::Text(title.clone()),
            });
        }
        if let Some(needle) = &self.title_contains {
            predicates.push(Predicate::Contains {
                field: "title",
                needle: needle.clone(),
            });
        }
        if let Some(author_id) = self.author_id {
            predicates.push(Predicate::Eq {
                field: "author_id",
                value: ScalarValue::Uuid(author_id),
            });
        }
        if let Some(genre_id) = self.genre_id {
            predicates.push(Predicate::Eq {
                field: "genre_id",
                value: ScalarValue::Uuid(genre_id),
            });
        }
        if let Some(year) = self.year_from {
            predicates.push(Predicate::Ge {
                field: "year",
                value: ScalarValue::Int(i64::from(year)),
            });
        }
        if let Some(year) = self.year_to {
            predicates.push(Predicate::Le {
                field: "year",
                value: ScalarValue::Int(i64::from(year)),
            });
        }
        if let Some(is_published) = self.is_published {
            predicates.push(Predicate::Eq {
                field: "is_published",
                value: ScalarValue::Bool(is_published),
            });
        }
        if let Some(after) = self.created_after {
            predicates.push(Predicate::Ge {
                field: "created_at",
                value: ScalarValue::Timestamp(after),
            });
        }
        if let Some(before) = self.created_before {
            predicates.push(Predicate::Le {
                field: "created_at",
                value: ScalarValue::Timestamp(before),
            });
        }
        predicates
    }
}

impl EntityFilter for BookFileFilter {
    fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        if let Some(book_id) = self.book_id {
            predicates.push(Predicate::Eq {
                field: "book_id",
                value: ScalarValue::Uuid(book_id),
            });
        }
        if let Some(storage_key) = &self.storage_key {
            predicates.push(Predicate::Eq {
                field: "storage_key",
                value: ScalarValue::Text(storage_key.clone()),
            });
        }
        if let Some(file_type) = self.file_type {
            predicates.push(Predicate::Eq {
                field: "file_type",
                value: ScalarValue::Text(file_type.as_str().to_owned()),
            });
        }
        predicates
    }
}

impl EntityFilter for UserFilter {
    fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        if let Some(username) = &self.username {
            predicates.push(Predicate::Eq {
                field: "username",
                value: ScalarValue::Text(username.clone()),
            });
        }
        if let Some(email) = &self.email {
            predicates.push(Predicate::Eq {
                field: "email",
                value: ScalarValue::Text(email.clone()),
            });
        }
        if let Some(is_active) = self.is_active {
            predicates.push(Predicate::Eq {
                field: "is_active",
                value: ScalarValue::Bool(is_active),
            });
        }
        predicates
    }
}

impl EntityFilter for HistoryFilter {
    fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        if let Some(book_id) = self.book_id {
            predicates.push(Predicate::Eq {
                field: "book_id",
                value: ScalarValue::Uuid(book_id),
            });
        }
        if let Some(user_id) = self.user_id {
            predicates.push(Predicate::Eq {
                field: "user_id",
                value: ScalarValue::Uuid(user_id),
            });
        }
        if let Some(action) = self.action {
            predicates.push(Predicate::Eq {
                field: "action",
                value: ScalarValue::Text(action.as_str().to_owned()),
            });
        }
        if let Some(after) = self.changed_after {
            predicates.push(Predicate::Ge {
                field: "changed_at",
                value: ScalarValue::Timestamp(after),
            });
        }
        if let Some(before) = self.changed_before {
            predicates.push(Predicate::Le {
                field: "changed_at",
                value: ScalarValue::Timestamp(before),
            });
        }
        predicates
    }
}

impl FieldRead for Author {
    fn field(&self, name: &str) -> Option<ScalarValue> {
        match name {
            "id" => Some(ScalarValue::Uuid(self.id)),
            "name" => Some(ScalarValue::Text(self.name.clone())),
            "bio" => self.bio.clone().map(ScalarValue::Text),
            _ => None,
        }
    }
}

impl FieldRead for Genre {
    fn field(&self, name: &str) -> Option<ScalarValue> {
        match name {
            "id" => Some(ScalarValue::Uuid(self.id)),
            "name" => Some(ScalarValue::Text(self.name.clone())),
            "description" => self.description.clone().map(ScalarValue::Text),
            _ => None,
        }
    }
}

impl FieldRead for Book {
    fn field(&self, name: &str) -> Option<ScalarValue> {
        match name {
            "id" => Some(ScalarValue::Uuid(self.id)),
            "title" => Some(ScalarValue::Text(self.title.clone())),
            "description" => self.description.clone().map(ScalarValue::Text),
            "author_id" => self.author_id.map(ScalarValue::Uuid),
            "genre_id" => self.genre_id.map(ScalarValue::Uuid),
            "year" => Some(ScalarValue::Int(i64::from(self.year))),
            "is_published" => Some(ScalarValue::Bool(self.is_published)),
            "created_at" => Some(ScalarValue::Timestamp(self.created_at)),
            _ => None,
        }
    }
}

impl FieldRead for BookFile {
    fn field(&self, name: &str) -> Option<ScalarValue> {
        match name {
            "id" => Some(ScalarValue::Uuid(self.id)),
            "book_id" => Some(ScalarValue::Uuid(self.book_id)),
            "storage_key" => Some(ScalarValue::Text(self.storage_key.clone())),
            "file_type" => Some(ScalarValue::Text(self.file_type.as_str().to_owned())),
            "original_name" => Some(ScalarValue::Text(self.original_name.clone())),
            "size_bytes" => Some(ScalarValue::Int(self.size_bytes)),
            "mime_type" => Some(ScalarValue::Text(self.mime_type.clone())),
            "created_at" => Some(ScalarValue::Timestamp(self.created_at)),
            _ => None,
        }
    }
}

impl FieldRead for User {
    fn field(&self, name: &str) -> Option<ScalarValue> {
        match name {
            "id" => Some(ScalarValue::Uuid(self.id)),
            "username" => Some(ScalarValue::Text(self.username.clone())),
            "email" => Some(ScalarValue::Text(self.email.clone())),
            "full_name" => self.full_name.clone().map(ScalarValue::Text),
            "is_active" => Some(ScalarValue::Bool(self.is_active)),
            _ => None,
        }
    }
}

impl FieldRead for BookHistory {
    fn field(&self, name: &str) -> Option<ScalarValue> {
        match name {
            "id" => Some(ScalarValue::Uuid(self.id)),
            "book_id" => Some(ScalarValue::Uuid(self.book_id)),
            "user_id" => Some(ScalarValue::Uuid(self.user_id)),
            "action" => Some(ScalarValue::Text(self.action.as_str().to_owned())),
            "changed_at" => Some(ScalarValue::Timestamp(self.changed_at)),
            _ => None,
        }
    }
}
