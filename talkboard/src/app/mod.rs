//! Application coordinator - wires together all components.
//!
//! This module builds, from a [`Config`]:
//! - The document store (`PostgreSQL`, or in-memory without `DATABASE_URL`),
//!   wrapped in per-call deadlines
//! - The sign-in flow (Google when credentials are configured)
//! - The domain services
//! - The HTTP router

use crate::config::Config;
use crate::server::{AppState, build_router};
use crate::services::{CertificateSigner, Services};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use talkboard_auth::providers::GoogleOAuthProvider;
use talkboard_auth::stores::{InMemorySessionStore, InMemoryStateStore};
use talkboard_auth::{LoginFlow, OAuth2Provider, OAuthConfig, UserDirectory};
use talkboard_core::document_store::{DocumentStore, StoreError};
use talkboard_core::environment::{Clock, SystemClock};
use talkboard_postgres::PostgresDocumentStore;
use talkboard_runtime::TimedStore;
use talkboard_runtime::retry::RetryPolicy;
use talkboard_testing::InMemoryDocumentStore;
use thiserror::Error;

/// Startup failures.
#[derive(Error, Debug)]
pub enum StartupError {
    /// The database could not be reached or migrated.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// The assembled application.
#[derive(Clone)]
pub struct TalkboardApp {
    config: Config,
    store: Arc<dyn DocumentStore>,
    login: LoginFlow,
    /// Domain services
    pub services: Services,
}

impl TalkboardApp {
    /// Connect to the configured store and wire everything.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::Store`] if `PostgreSQL` is configured but
    /// cannot be reached or migrated.
    pub async fn new(config: Config) -> Result<Self, StartupError> {
        let store: Arc<dyn DocumentStore> = match &config.database.url {
            Some(url) => {
                let postgres = PostgresDocumentStore::connect(url, config.database.max_connections).await?;
                postgres.migrate().await?;
                tracing::info!("Using PostgreSQL document store");
                Arc::new(postgres)
            }
            None => {
                tracing::warn!("DATABASE_URL not set; data lives in memory and is lost on restart");
                Arc::new(InMemoryDocumentStore::new())
            }
        };

        let provider: Option<Arc<dyn OAuth2Provider>> =
            match (&config.auth.google_client_id, &config.auth.google_client_secret) {
                (Some(id), Some(secret)) => Some(Arc::new(GoogleOAuthProvider::new(id.clone(), secret.clone()))),
                _ => {
                    tracing::warn!("Google sign-in not configured; /auth/google/login will answer 503");
                    None
                }
            };

        Ok(Self::assemble(config, store, provider, Arc::new(SystemClock)))
    }

    /// Wire the application over an existing store and provider.
    ///
    /// Used by [`new`](Self::new) and by tests that bring their own store,
    /// clock and identity provider.
    #[must_use]
    pub fn assemble(
        config: Config,
        store: Arc<dyn DocumentStore>,
        provider: Option<Arc<dyn OAuth2Provider>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store: Arc<dyn DocumentStore> = Arc::new(TimedStore::new(store, config.store_timeout()));
        let retry = RetryPolicy::builder()
            .max_retries(config.store.max_retries)
            .initial_delay(Duration::from_millis(config.store.retry_initial_ms))
            .build();

        let session_ttl = i64::try_from(config.auth.session_ttl).unwrap_or(i64::MAX);
        let oauth = OAuthConfig::new(config.auth.base_url.clone())
            .with_session_duration(chrono::Duration::seconds(session_ttl));
        let login = LoginFlow::new(
            provider,
            Arc::new(InMemoryStateStore::new(clock.clone())),
            Arc::new(InMemorySessionStore::new(clock.clone())),
            UserDirectory::new(store.clone(), clock.clone(), retry.clone()),
            clock.clone(),
            oauth,
        );

        let signer = config
            .certificate_secret
            .as_deref()
            .map_or_else(CertificateSigner::random, CertificateSigner::new);
        let services = Services::new(store.clone(), clock, retry, signer, login.clone());

        Self {
            config,
            store,
            login,
            services,
        }
    }

    /// The HTTP router.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(AppState {
            services: self.services.clone(),
            login: self.login.clone(),
            store: self.store.clone(),
        })
    }

    /// The sign-in flow.
    #[must_use]
    pub const fn login(&self) -> &LoginFlow {
        &self.login
    }

    /// The configuration the app was built from.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }
}
