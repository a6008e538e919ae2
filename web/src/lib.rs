//! Axum integration for talkboard.
//!
//! The application crate owns its routes and state; this crate supplies the
//! HTTP plumbing they share:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  correlation_id_layer + http_trace_layer │  ← every request
//! ├──────────────────────────────────────────┤
//! │  extractors: BearerToken, CorrelationId, │  ← request parsing
//! │  ClientIp, UserAgent                     │
//! ├──────────────────────────────────────────┤
//! │  service call (ledger, catalog, ...)     │
//! ├──────────────────────────────────────────┤
//! │  AppError: DomainError/AuthError → JSON  │  ← failures
//! │  stream_views: snapshots → WebSocket     │  ← live views
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use talkboard_web::{AppError, correlation_id_layer, handlers};
//!
//! let app = Router::new()
//!     .route("/health", get(handlers::health_check))
//!     .route("/ready", get(handlers::readiness))
//!     .layer(correlation_id_layer())
//!     .with_state(state);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

pub use error::AppError;
pub use extractors::{BearerToken, ClientIp, CorrelationId, UserAgent};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer, http_trace_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
