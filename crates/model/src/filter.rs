use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{FileType, HistoryAction};

/// Search criteria for authors. Absent fields impose no constraint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorFilter {
    /// Exact name match.
    pub name: Option<String>,
    /// Case-insensitive substring search in the biography.
    pub bio_contains: Option<String>,
}

/// Search criteria for genres.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenreFilter {
    /// Exact name match.
    pub name: Option<String>,
    /// Case-insensitive substring search in the description.
    pub description_contains: Option<String>,
}

/// Search criteria for books.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookFilter {
    /// Exact title match.
    pub title: Option<String>,
    /// Case-insensitive substring search in the title.
    pub title_contains: Option<String>,
    pub author_id: Option<Uuid>,
    pub genre_id: Option<Uuid>,
    /// Inclusive lower bound on the publication year.
    pub year_from: Option<i32>,
    /// Inclusive upper bound on the publication year.
    pub year_to: Option<i32>,
    pub is_published: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

/// Search criteria for book files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookFileFilter {
    pub book_id: Option<Uuid>,
    pub storage_key: Option<String>,
    pub file_type: Option<FileType>,
}

/// Search criteria for users.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserFilter {
    pub username: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

/// Search criteria for book history entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryFilter {
    pub book_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub action: Option<HistoryAction>,
    pub changed_after: Option<DateTime<Utc>>,
    pub changed_before: Option<DateTime<Utc>>,
}
