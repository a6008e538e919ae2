//! The authorization code flow, from redirect to bearer token.
//!
//! ```text
//! begin()      -> state issued, browser sent to the provider
//! complete()   -> state consumed, code exchanged, user provisioned,
//!                 role read, session stored, token returned
//! authenticate -> token resolved to a SessionContext on every request
//! ```

use crate::config::OAuthConfig;
use crate::directory::UserDirectory;
use crate::error::{AuthError, Result};
use crate::providers::{OAuth2Provider, Session, SessionStore, StateStore};
use crate::utils::generate_token;
use std::sync::Arc;
use talkboard_core::environment::Clock;
use talkboard_core::ids::UserId;
use talkboard_core::model::User;
use talkboard_core::role::Role;
use talkboard_core::session::SessionContext;

/// Sign-in orchestration over the provider, stores and user directory.
#[derive(Clone)]
pub struct LoginFlow {
    provider: Option<Arc<dyn OAuth2Provider>>,
    states: Arc<dyn StateStore>,
    sessions: Arc<dyn SessionStore>,
    directory: UserDirectory,
    clock: Arc<dyn Clock>,
    config: OAuthConfig,
}

impl LoginFlow {
    /// Wire the flow. `provider` is `None` when sign-in is not configured;
    /// existing sessions still authenticate.
    #[must_use]
    pub fn new(
        provider: Option<Arc<dyn OAuth2Provider>>,
        states: Arc<dyn StateStore>,
        sessions: Arc<dyn SessionStore>,
        directory: UserDirectory,
        clock: Arc<dyn Clock>,
        config: OAuthConfig,
    ) -> Self {
        Self {
            provider,
            states,
            sessions,
            directory,
            clock,
            config,
        }
    }

    fn provider(&self) -> Result<&dyn OAuth2Provider> {
        self.provider.as_deref().ok_or(AuthError::ProviderNotConfigured)
    }

    /// Start a sign-in: issue a CSRF state and return the provider URL.
    ///
    /// # Errors
    ///
    /// `ProviderNotConfigured`, or a state store failure.
    pub async fn begin(&self) -> Result<String> {
        let provider = self.provider()?;
        let state = generate_token();
        let url = provider.authorization_url(&state, &self.config.redirect_uri())?;
        self.states.issue(state, self.config.state_ttl).await?;
        Ok(url)
    }

    /// Finish a sign-in and open a session.
    ///
    /// # Errors
    ///
    /// `OAuthStateInvalid` for an unknown or replayed state, provider errors
    /// from the code exchange, and user store errors from provisioning.
    pub async fn complete(&self, code: &str, state: &str) -> Result<Session> {
        let provider = self.provider()?;
        self.states.consume(state).await?;

        let redirect_uri = self.config.redirect_uri();
        let access_token = provider.exchange_code(code, &redirect_uri).await?;
        let profile = provider.fetch_profile(&access_token).await?;
        let user = self.directory.provision(&profile).await?;

        self.open_session(&user).await
    }

    /// Store a session for `user`, reading the role from the user document.
    ///
    /// # Errors
    ///
    /// Returns error if the session store fails.
    pub async fn open_session(&self, user: &User) -> Result<Session> {
        let role = Role::parse(&user.role).unwrap_or_else(|e| {
            tracing::warn!(user_id = %user.id, error = %e, "Unknown stored role, signing in as participant");
            Role::Participant
        });

        let now = self.clock.now();
        let session = Session {
            token: generate_token(),
            user_id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role,
            image: user.image.clone(),
            created_at: now,
            expires_at: now + self.config.session_duration,
        };
        self.sessions.create_session(session.clone()).await?;

        tracing::info!(user_id = %user.id, role = %role, "Session opened");
        Ok(session)
    }

    /// Resolve a bearer token.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` or `SessionExpired`.
    pub async fn session(&self, token: &str) -> Result<Session> {
        self.sessions.get_session(token).await
    }

    /// Resolve a bearer token to the caller context.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` or `SessionExpired`.
    pub async fn authenticate(&self, token: &str) -> Result<SessionContext> {
        Ok(self.session(token).await?.context())
    }

    /// End a session.
    ///
    /// # Errors
    ///
    /// Returns error if the session store fails.
    pub async fn logout(&self, token: &str) -> Result<()> {
        self.sessions.delete_session(token).await
    }

    /// End every session of a user so a role change or deletion takes effect
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns error if the session store fails.
    pub async fn revoke_user(&self, user_id: &UserId) -> Result<usize> {
        let removed = self.sessions.delete_user_sessions(user_id).await?;
        if removed > 0 {
            tracing::info!(user_id = %user_id, removed, "Sessions revoked");
        }
        Ok(removed)
    }
}
