//! HTTP server module for talkboard.
//!
//! This module provides the Axum-based HTTP server with:
//! - Application state management
//! - The session extractor
//! - Router configuration

pub mod routes;
pub mod session;
pub mod state;

pub use routes::build_router;
pub use session::CurrentUser;
pub use state::AppState;
