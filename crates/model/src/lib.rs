pub mod entity;
pub mod filter;
pub mod input;

pub use entity::{
    Author, Book, BookFile, BookHistory, FileType, Genre, HistoryAction, User, UserRole,
};
pub use filter::{
    AuthorFilter, BookFileFilter, BookFilter, GenreFilter, HistoryFilter, UserFilter,
};
pub use input::{
    AuthorPatch, BookFilePatch, BookPatch, GenrePatch, InvalidInput, NewAuthor, NewBook,
    NewBookFile, NewGenre, NewHistoryEntry, NewUser, UserPatch,
};
