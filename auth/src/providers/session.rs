//! Session and CSRF-state store traits.

use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use talkboard_core::ids::UserId;
use talkboard_core::role::Role;
use talkboard_core::session::SessionContext;

/// A server-side session, referenced by an opaque bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token.
    pub token: String,

    /// Signed-in user.
    pub user_id: UserId,

    /// Display name at sign-in.
    pub name: String,

    /// Normalized email at sign-in.
    pub email: String,

    /// Role read from the user document at sign-in.
    pub role: Role,

    /// Avatar URL.
    pub image: Option<String>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Expiry timestamp.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// The caller context passed to every service call.
    #[must_use]
    pub fn context(&self) -> SessionContext {
        SessionContext::new(self.user_id.clone(), self.name.clone(), &self.email, self.role)
    }

    /// Whether the session has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Session store.
///
/// # Implementation Notes
///
/// - Sessions expire after a fixed TTL (no sliding expiration)
/// - Expired sessions are reported as `SessionExpired` and removed
pub trait SessionStore: Send + Sync {
    /// Store a new session.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn create_session(
        &self,
        session: Session,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Look up a session by token.
    ///
    /// # Errors
    ///
    /// - Session not found → `AuthError::SessionNotFound`
    /// - Session expired → `AuthError::SessionExpired`
    fn get_session<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Session>> + Send + 'a>>;

    /// Delete a session. Deleting an unknown token is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn delete_session<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Delete every session of a user (after a role change or account
    /// deletion). Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn delete_user_sessions<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + 'a>>;
}

/// Pending OAuth `state` values.
///
/// A state is single-use: `consume` succeeds at most once per issued value.
pub trait StateStore: Send + Sync {
    /// Remember `state` for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn issue(
        &self,
        state: String,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Take `state` out of the store.
    ///
    /// # Errors
    ///
    /// `OAuthStateInvalid` if it was never issued, already used, or expired.
    fn consume<'a>(&'a self, state: &'a str)
    -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
