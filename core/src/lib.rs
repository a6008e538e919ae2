//! # Talkboard Core
//!
//! Domain types and contracts shared by every talkboard crate.
//!
//! ## Contents
//!
//! - **Model**: [`Talk`](model::Talk), [`Registration`](model::Registration),
//!   [`User`](model::User) and their identifiers
//! - **Role Gate**: [`permissions_for`](role::permissions_for), a pure mapping from
//!   role to permission set, plus talk-scoped ownership checks
//! - **Session context**: [`SessionContext`](session::SessionContext), passed
//!   explicitly into every service call
//! - **Document store**: the [`DocumentStore`](document_store::DocumentStore) trait
//!   with atomic multi-document commits and snapshot subscriptions
//! - **Errors**: [`DomainError`](error::DomainError), the taxonomy every service returns
//!
//! ## Data flow
//!
//! ```text
//! request ─> Role Gate ─> ledger read/commit ─> snapshot to subscribers
//! ```
//!
//! Services never hold ambient state. The authenticated caller travels as a
//! `SessionContext` value and all persistence goes through a `DocumentStore`.

// Re-export commonly used types
pub use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod document_store;
pub mod error;
pub mod ids;
pub mod model;
pub mod records;
pub mod role;
pub mod session;
pub mod subscription;

pub use document_store::{Collection, Document, DocumentStore, Query, Revision, StoreError, WriteOp};
pub use error::DomainError;
pub use ids::{MaterialId, RegistrationId, TalkId, UserId};
pub use model::{Material, Participant, Registration, Speaker, Talk, User};
pub use role::{Permission, Permissions, Role, TalkAccess, permissions_for};
pub use session::SessionContext;
pub use subscription::{LiveView, Snapshot};

/// Environment module - injected dependencies
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use talkboard_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
