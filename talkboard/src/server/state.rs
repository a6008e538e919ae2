//! Application state for the talkboard HTTP server.
//!
//! Contains all shared resources needed by HTTP handlers:
//! - Domain services (catalog, ledger, attendance, certificates, reports, users)
//! - The sign-in flow (session validation)
//! - The document store (readiness probe)

use crate::services::Services;
use axum::extract::FromRef;
use std::sync::Arc;
use talkboard_auth::LoginFlow;
use talkboard_core::document_store::DocumentStore;

/// Application state shared across all HTTP handlers.
///
/// Cloned per request; every field is a handle.
#[derive(Clone)]
pub struct AppState {
    /// Domain services
    pub services: Services,
    /// Sign-in flow and session lookup
    pub login: LoginFlow,
    /// Document store, for health checks
    pub store: Arc<dyn DocumentStore>,
}

// Lets the session extractor pull the login flow out of the state
impl FromRef<AppState> for LoginFlow {
    fn from_ref(state: &AppState) -> Self {
        state.login.clone()
    }
}

// Lets the shared readiness handler reach the store
impl FromRef<AppState> for Arc<dyn DocumentStore> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}
