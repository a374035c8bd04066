use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{FileType, HistoryAction, UserRole};

/// An input value violates a required-field or length invariant.
///
/// Uniqueness is not checked here; that is the store's job.
#[derive(Debug, thiserror::Error)]
pub enum InvalidInput {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} must not be negative")]
    Negative { field: &'static str },

    #[error("a user must hold at least one role")]
    NoRoles,
}

fn required(field: &'static str, value: &str, max: usize) -> Result<(), InvalidInput> {
    if value.trim().is_empty() {
        return Err(InvalidInput::Empty { field });
    }
    bounded(field, value, max)
}

fn bounded(field: &'static str, value: &str, max: usize) -> Result<(), InvalidInput> {
    if value.chars().count() > max {
        return Err(InvalidInput::TooLong { field, max });
    }
    Ok(())
}

/// Input for creating an author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuthor {
    pub name: String,
    pub bio: Option<String>,
}

impl NewAuthor {
    pub fn validate(&self) -> Result<(), InvalidInput> {
        required("name", &self.name, 100)
    }
}

/// Partial update for an author. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorPatch {
    pub name: Option<String>,
    pub bio: Option<String>,
}

impl AuthorPatch {
    pub fn validate(&self) -> Result<(), InvalidInput> {
        if let Some(name) = &self.name {
            required("name", name, 100)?;
        }
        Ok(())
    }
}

/// Input for creating a genre.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGenre {
    pub name: String,
    pub description: Option<String>,
}

impl NewGenre {
    pub fn validate(&self) -> Result<(), InvalidInput> {
        required("name", &self.name, 50)
    }
}

/// Partial update for a genre.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenrePatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl GenrePatch {
    pub fn validate(&self) -> Result<(), InvalidInput> {
        if let Some(name) = &self.name {
            required("name", name, 50)?;
        }
        Ok(())
    }
}

/// Input for creating a book. `created_at` is assigned by the repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub description: Option<String>,
    pub author_id: Option<Uuid>,
    pub genre_id: Option<Uuid>,
    pub year: i32,
    pub is_published: bool,
}

impl NewBook {
    pub fn validate(&self) -> Result<(), InvalidInput> {
        required("title", &self.title, 200)
    }
}

/// Partial update for a book.
///
/// Carries no `created_at`, so creation stamps cannot be rewritten.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub author_id: Option<Uuid>,
    pub genre_id: Option<Uuid>,
    pub year: Option<i32>,
    pub is_published: Option<bool>,
}

impl BookPatch {
    pub fn validate(&self) -> Result<(), InvalidInput> {
        if let Some(title) = &self.title {
            required("title", title, 200)?;
        }
        Ok(())
    }

    /// True when the patch carries no fields at all.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.author_id.is_none()
            && self.genre_id.is_none()
            && self.year.is_none()
            && self.is_published.is_none()
    }
}

/// Input for recording a stored blob as a book file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBookFile {
    pub book_id: Uuid,
    pub storage_key: String,
    pub file_type: FileType,
    pub original_name: String,
    pub size_bytes: i64,
    pub mime_type: String,
}

impl NewBookFile {
    pub fn validate(&self) -> Result<(), InvalidInput> {
        required("storage_key", &self.storage_key, 255)?;
        required("original_name", &self.original_name, 100)?;
        bounded("mime_type", &self.mime_type, 50)?;
        if self.size_bytes < 0 {
            return Err(InvalidInput::Negative {
                field: "size_bytes",
            });
        }
        Ok(())
    }
}

/// Partial update for a book file. The storage key is immutable: the row
/// names exactly one blob for its whole lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookFilePatch {
    pub original_name: Option<String>,
    pub mime_type: Option<String>,
}

impl BookFilePatch {
    pub fn validate(&self) -> Result<(), InvalidInput> {
        if let Some(name) = &self.original_name {
            required("original_name", name, 100)?;
        }
        if let Some(mime) = &self.mime_type {
            bounded("mime_type", mime, 50)?;
        }
        Ok(())
    }
}

/// Input for registering a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub full_name: Option<String>,
    pub roles: Vec<UserRole>,
    pub is_active: bool,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), InvalidInput> {
        required("username", &self.username, 50)?;
        required("email", &self.email, 100)?;
        required("hashed_password", &self.hashed_password, 255)?;
        if let Some(full_name) = &self.full_name {
            bounded("full_name", full_name, 100)?;
        }
        if self.roles.is_empty() {
            return Err(InvalidInput::NoRoles);
        }
        Ok(())
    }
}

/// Partial update for a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub hashed_password: Option<String>,
    pub full_name: Option<String>,
    pub roles: Option<Vec<UserRole>>,
    pub is_active: Option<bool>,
}

impl UserPatch {
    pub fn validate(&self) -> Result<(), InvalidInput> {
        if let Some(username) = &self.username {
            required("username", username, 50)?;
        }
        if let Some(email) = &self.email {
            required("email", email, 100)?;
        }
        if let Some(password) = &self.hashed_password {
            required("hashed_password", password, 255)?;
        }
        if let Some(full_name) = &self.full_name {
            bounded("full_name", full_name, 100)?;
        }
        if let Some(roles) = &self.roles {
            if roles.is_empty() {
                return Err(InvalidInput::NoRoles);
            }
        }
        Ok(())
    }
}

/// Input for appending a book history entry.
///
/// Only the audit recorder constructs these; `changed_at` is stamped by the
/// repository when the row is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewHistoryEntry {
    pub book_id: Uuid,
    pub user_id: Uuid,
    pub action: HistoryAction,
    pub old_values: Option<serde_json::Map<String, serde_json::Value>>,
    pub new_values: Option<serde_json::Map<String, serde_json::Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_author_name_is_rejected() {
        let input = NewAuthor {
            name: "  ".to_owned(),
            bio: None,
        };
        assert!(matches!(
            input.validate(),
            Err(InvalidInput::Empty { field: "name" })
        ));
    }

    #[test]
    fn overlong_title_is_rejected() {
        let input = NewBook {
            title: "x".repeat(201),
            description: None,
            author_id: None,
            genre_id: None,
            year: 2000,
            is_published: false,
        };
        assert!(matches!(
            input.validate(),
            Err(InvalidInput::TooLong { field: "title", max: 200 })
        ));
    }

    #[test]
    fn user_without_roles_is_rejected() {
        let input = NewUser {
            username: "reader".to_owned(),
            email: "reader@example.com".to_owned(),
            hashed_password: "argon2id$...".to_owned(),
            full_name: None,
            roles: vec![],
            is_active: true,
        };
        assert!(matches!(input.validate(), Err(InvalidInput::NoRoles)));
    }

    #[test]
    fn patch_with_no_fields_is_valid_and_empty() {
        let patch = BookPatch::default();
        assert!(patch.validate().is_ok());
        assert!(patch.is_empty());
    }
}
