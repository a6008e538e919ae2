//! Error types for sign-in and sessions.

use talkboard_core::document_store::StoreError;
use thiserror::Error;

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Failure modes of the sign-in flow and session lookup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    // ═══════════════════════════════════════════════════════════
    // Sign-in Errors
    // ═══════════════════════════════════════════════════════════
    /// OAuth authorization code is invalid.
    #[error("Invalid OAuth authorization code")]
    OAuthCodeInvalid,

    /// OAuth state parameter is unknown or expired (CSRF protection).
    #[error("Invalid OAuth state parameter")]
    OAuthStateInvalid,

    /// The provider rejected the code exchange.
    #[error("OAuth token exchange failed: {0}")]
    OAuthTokenExchangeFailed(String),

    /// The provider's profile endpoint failed.
    #[error("OAuth user info request failed: {0}")]
    OAuthUserInfoFailed(String),

    /// The provider has not verified the account's email.
    #[error("Email address is not verified")]
    EmailNotVerified,

    /// Sign-in is not configured on this server.
    #[error("Sign-in provider is not configured")]
    ProviderNotConfigured,

    // ═══════════════════════════════════════════════════════════
    // Session Errors
    // ═══════════════════════════════════════════════════════════
    /// No bearer token on the request.
    #[error("Authentication required")]
    MissingToken,

    /// Session not found.
    #[error("Session not found")]
    SessionNotFound,

    /// Session has expired.
    #[error("Session has expired")]
    SessionExpired,

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════
    /// The user store failed.
    #[error("User store error: {0}")]
    Store(#[from] StoreError),

    /// Internal server error (should not be exposed to users).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    /// Returns `true` if the caller must (re-)authenticate.
    ///
    /// # Examples
    ///
    /// ```
    /// # use talkboard_auth::AuthError;
    /// assert!(AuthError::SessionExpired.is_unauthenticated());
    /// assert!(!AuthError::InternalError("boom".into()).is_unauthenticated());
    /// ```
    #[must_use]
    pub const fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            Self::MissingToken | Self::SessionNotFound | Self::SessionExpired
        )
    }

    /// Returns `true` if this error is due to a bad sign-in attempt.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::OAuthCodeInvalid | Self::OAuthStateInvalid | Self::EmailNotVerified
        )
    }
}

impl talkboard_runtime::retry::Retryable for AuthError {
    fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}
