use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role granted to a catalogue user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Editor,
    Viewer,
}

impl UserRole {
    /// The wire value stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        }
    }

    /// Parse a wire value back into a role.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "editor" => Some(Self::Editor),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }
}

/// Kind of binary attached to a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Cover,
    Pdf,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cover => "cover",
            Self::Pdf => "pdf",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cover" => Some(Self::Cover),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

/// Kind of mutation recorded in the book history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Create,
    Update,
    Delete,
}

impl HistoryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// An author of one or more books.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: Uuid,
    /// Display name, unique across authors.
    pub name: String,
    pub bio: Option<String>,
}

/// A genre books can be shelved under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: Uuid,
    /// Genre name, unique across genres.
    pub name: String,
    pub description: Option<String>,
}

/// A catalogued book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub author_id: Option<Uuid>,
    pub genre_id: Option<Uuid>,
    pub year: i32,
    pub is_published: bool,
    /// Set once at creation and immutable afterwards.
    pub created_at: DateTime<Utc>,
}

/// Metadata for a binary stored in the blob store.
///
/// The bytes themselves live under `storage_key`; the row exists only while
/// the blob does. Sequencing of the two writes is the caller's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookFile {
    pub id: Uuid,
    pub book_id: Uuid,
    /// Globally unique key into the blob store.
    pub storage_key: String,
    pub file_type: FileType,
    pub original_name: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

/// A registered user and actor of book mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub full_name: Option<String>,
    /// Never empty.
    pub roles: Vec<UserRole>,
    pub is_active: bool,
}

/// One append-only entry in a book's change history.
///
/// `old_values` is absent for `create` actions, `new_values` for `delete`;
/// for `update` both maps hold the changed fields only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookHistory {
    pub id: Uuid,
    pub book_id: Uuid,
    /// The user who performed the mutation.
    pub user_id: Uuid,
    pub action: HistoryAction,
    pub changed_at: DateTime<Utc>,
    pub old_values: Option<serde_json::Map<String, serde_json::Value>>,
    pub new_values: Option<serde_json::Map<String, serde_json::Value>>,
}
