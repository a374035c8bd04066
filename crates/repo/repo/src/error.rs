use librarium_blob::BlobError;
use librarium_identity::IdentityError;
use librarium_model::InvalidInput;
use thiserror::Error;

/// Errors from repository and unit-of-work operations.
///
/// An absent row is not an error: single-record lookups return `Ok(None)`
/// and `delete` returns `Ok(false)`. Every variant here must roll the
/// enclosing unit of work back. Messages name the offending field or key
/// without leaking backend internals.
#[derive(Debug, Error)]
pub enum RepoError {
    /// A malformed filter, unknown `order_by` field or out-of-range page.
    #[error("validation error: {0}")]
    Validation(String),

    /// A uniqueness or required-field invariant was breached.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// A concurrent mutation was detected by the store.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The identity service rejected the caller's credential.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The caller is authenticated but not allowed to act.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The relational or blob store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<InvalidInput> for RepoError {
    fn from(err: InvalidInput) -> Self {
        Self::Constraint(err.to_string())
    }
}

impl From<BlobError> for RepoError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::TooLarge { .. } => Self::Validation(err.to_string()),
            BlobError::Storage(msg) => Self::Unavailable(msg),
        }
    }
}

impl From<IdentityError> for RepoError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Unauthenticated(msg) => Self::Unauthenticated(msg),
            IdentityError::Forbidden(msg) => Self::Forbidden(msg),
            IdentityError::Unavailable(msg) => Self::Unavailable(msg),
        }
    }
}
