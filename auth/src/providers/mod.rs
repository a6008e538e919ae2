//! Authentication providers.
//!
//! Traits for the external dependencies of sign-in: the identity provider
//! that vouches for an email, and the stores holding sessions and pending
//! CSRF states. The login flow depends on these traits; the server wires in
//! concrete implementations and tests use the mocks.

use serde::{Deserialize, Serialize};

pub mod google;
pub mod oauth;
pub mod session;

pub use google::GoogleOAuthProvider;
pub use oauth::OAuth2Provider;
pub use session::{Session, SessionStore, StateStore};

/// What the identity provider tells us about a signed-in person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    /// Stable subject id at the provider. Becomes the `UserId`.
    pub subject: String,

    /// Email address.
    pub email: String,

    /// Whether the provider verified the email.
    pub email_verified: bool,

    /// Display name.
    pub name: Option<String>,

    /// Avatar URL.
    pub picture: Option<String>,
}
