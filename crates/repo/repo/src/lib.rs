pub mod entity;
pub mod error;
pub mod files;
pub mod query;
pub mod repository;
pub mod testing;

pub use entity::{
    Authors, BookFiles, Books, Entity, EntityFilter, FieldRead, Genres, History, HistoryNoUpdate,
    Users,
};
pub use error::RepoError;
pub use files::FileService;
pub use query::{
    CompiledQuery, DEFAULT_LIMIT, MAX_LIMIT, Page, Predicate, ScalarValue, SortDirection, compile,
};
pub use repository::{
    AuthorRepository, BookFileRepository, BookRepository, Catalogue, GenreRepository,
    HistoryRepository, Repository, UnitOfWork, UserRepository,
};
