pub mod error;
pub mod provider;

pub use error::IdentityError;
pub use provider::{AuthenticatedUser, IdentityProvider, StaticIdentityProvider};
