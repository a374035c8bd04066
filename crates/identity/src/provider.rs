use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use librarium_model::UserRole;

use crate::error::IdentityError;

/// The verified identity behind a bearer credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
    pub roles: Vec<UserRole>,
}

impl AuthenticatedUser {
    pub fn has_role(&self, role: UserRole) -> bool {
        self.roles.contains(&role)
    }
}

/// Verifies bearer credentials against an external identity service.
///
/// Token issuance, refresh and revocation are entirely the service's
/// business; this trait only turns an opaque credential into a user id and
/// role set.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, credential: &str) -> Result<AuthenticatedUser, IdentityError>;
}

/// A fixed credential-to-identity table, for tests and local development.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, AuthenticatedUser>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a credential mapping and return the provider for chaining.
    pub fn with_token(mut self, credential: impl Into<String>, user: AuthenticatedUser) -> Self {
        self.tokens.insert(credential.into(), user);
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn authenticate(&self, credential: &str) -> Result<AuthenticatedUser, IdentityError> {
        self.tokens
            .get(credential)
            .cloned()
            .ok_or_else(|| IdentityError::Unauthenticated("unknown credential".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor() -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            username: "editor".to_owned(),
            roles: vec![UserRole::Editor],
        }
    }

    #[tokio::test]
    async fn known_credential_authenticates() {
        let user = editor();
        let provider = StaticIdentityProvider::new().with_token("tok-1", user.clone());
        let resolved = provider.authenticate("tok-1").await.unwrap();
        assert_eq!(resolved, user);
        assert!(resolved.has_role(UserRole::Editor));
        assert!(!resolved.has_role(UserRole::Admin));
    }

    #[tokio::test]
    async fn unknown_credential_is_unauthenticated() {
        let provider = StaticIdentityProvider::new();
        let err = provider.authenticate("nope").await.unwrap_err();
        assert!(matches!(err, IdentityError::Unauthenticated(_)));
    }
}
