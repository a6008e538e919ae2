//! Sign-in configuration.
//!
//! Values are provided by the application, not hardcoded.

use chrono::Duration;

/// OAuth2 sign-in and session configuration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Public base URL of the server (e.g., "https://talks.example.com").
    ///
    /// Redirect URI will be: `{base_url}/auth/google/callback`
    pub base_url: String,

    /// CSRF state time-to-live.
    ///
    /// Default: 10 minutes
    pub state_ttl: Duration,

    /// Session duration after successful sign-in.
    ///
    /// Default: 24 hours
    pub session_duration: Duration,
}

impl OAuthConfig {
    /// Create new OAuth configuration.
    #[must_use]
    pub const fn new(base_url: String) -> Self {
        Self {
            base_url,
            state_ttl: Duration::minutes(10),
            session_duration: Duration::hours(24),
        }
    }

    /// Set CSRF state time-to-live.
    #[must_use]
    pub const fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    /// Set session duration.
    #[must_use]
    pub const fn with_session_duration(mut self, duration: Duration) -> Self {
        self.session_duration = duration;
        self
    }

    /// Callback URL registered with the provider.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("{}/auth/google/callback", self.base_url.trim_end_matches('/'))
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self::new("http://localhost:8080".to_string())
    }
}
