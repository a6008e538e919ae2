//! Store implementations.
//!
//! In-memory session and state stores. Sessions live in the server process,
//! so a restart signs everybody out.

pub mod memory;

pub use memory::{InMemorySessionStore, InMemoryStateStore};
