use thiserror::Error;

/// Errors from the delegated identity service.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The credential is missing, expired or unverifiable.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The credential is valid but the account may not act.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The identity service could not be reached.
    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}
