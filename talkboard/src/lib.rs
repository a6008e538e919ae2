//! # Talkboard
//!
//! Registration service for talks and workshops: a catalog of talks, a
//! capacity-checked registration ledger, attendance tracking, certificate
//! validation and issuance, attendance reports and user administration,
//! served over JSON/HTTP with Google sign-in.
//!
//! ## Architecture
//!
//! ```text
//! HTTP (axum) ─> api handlers ─> services ─> DocumentStore (PostgreSQL | in-memory)
//!                     │              │
//!               CurrentUser      RetryPolicy + conditional commits
//!               (LoginFlow)
//! ```
//!
//! Every mutation is a read-check-commit cycle: the commit is conditional on
//! the revisions that were read, and a conflicting commit is retried from
//! the read. Two participants racing for the last seat therefore cannot both
//! get it.

pub mod api;
pub mod app;
pub mod config;
pub mod server;
pub mod services;

pub use app::{StartupError, TalkboardApp};
pub use config::Config;
