//! # Talkboard Authentication
//!
//! Google sign-in, server-side sessions and first-login provisioning.
//!
//! ## Features
//!
//! - **OAuth2 authorization code flow** with single-use CSRF states
//! - **Opaque bearer tokens** resolved to a [`SessionContext`] per request
//! - **First-login provisioning**: the first account ever becomes an
//!   administrator, everybody after that a participant
//! - **Testable**: mock provider and in-memory stores
//!
//! ## Example: sign-in
//!
//! ```rust,ignore
//! use talkboard_auth::*;
//!
//! // 1. Redirect the browser
//! let url = flow.begin().await?;
//!
//! // 2. Provider redirects back with ?code=..&state=..
//! let session = flow.complete(&code, &state).await?;
//!
//! // 3. Later requests carry `Authorization: Bearer {session.token}`
//! let caller = flow.authenticate(&session.token).await?;
//! ```
//!
//! [`SessionContext`]: talkboard_core::session::SessionContext

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod config;
pub mod directory;
pub mod error;
pub mod login;
pub mod mocks;
pub mod providers;
pub mod stores;
pub mod utils;

// Re-export main types for convenience
pub use config::OAuthConfig;
pub use directory::UserDirectory;
pub use error::{AuthError, Result};
pub use login::LoginFlow;
pub use providers::{IdentityProfile, OAuth2Provider, Session, SessionStore, StateStore};
