//! Error taxonomy shared by every talkboard service.

use crate::document_store::StoreError;
use crate::ids::TalkId;
use crate::role::Permission;
use thiserror::Error;

/// Errors returned by the ledger, catalog, attendance, certificate and user services.
///
/// All failures are per-request. None of them is fatal to the process.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A required field is missing or malformed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The Role Gate rejected the call.
    #[error("Permission denied: requires {permission}")]
    PermissionDenied {
        /// The permission the caller lacks.
        permission: Permission,
    },

    /// The talk has no seats left.
    #[error("Talk {talk_id} is full ({capacity} seats)")]
    CapacityExceeded {
        /// The full talk.
        talk_id: TalkId,
        /// Its capacity.
        capacity: u32,
    },

    /// The participant already holds a registration for the talk.
    #[error("{email} is already registered for talk {talk_id}")]
    DuplicateRegistration {
        /// The talk.
        talk_id: TalkId,
        /// Normalized participant email.
        email: String,
    },

    /// The speaker or creator tried to register for their own talk.
    #[error("{email} presents talk {talk_id} and cannot register for it")]
    SelfRegistrationForbidden {
        /// The talk.
        talk_id: TalkId,
        /// Normalized email of the speaker or creator.
        email: String,
    },

    /// No matching registration exists.
    #[error("Registration not found: {0}")]
    RegistrationNotFound(String),

    /// A talk, user or material does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up.
        kind: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// Transient infrastructure failure that outlasted the retry budget.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Denormalized state could not be corrected.
    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),
}

impl DomainError {
    /// Shorthand for a missing talk.
    #[must_use]
    pub fn talk_not_found(talk_id: TalkId) -> Self {
        Self::NotFound {
            kind: "Talk",
            id: talk_id.to_string(),
        }
    }

    /// Shorthand for a validation failure.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether the caller can fix the request and try again.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::PermissionDenied { .. }
                | Self::CapacityExceeded { .. }
                | Self::DuplicateRegistration { .. }
                | Self::SelfRegistrationForbidden { .. }
                | Self::RegistrationNotFound(_)
                | Self::NotFound { .. }
        )
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) | StoreError::Database(msg) => Self::StoreUnavailable(msg),
            StoreError::ConcurrencyConflict { .. } => {
                Self::StoreUnavailable(format!("write contention persisted: {err}"))
            }
            StoreError::NotFound { collection, id } => Self::NotFound {
                kind: collection.kind(),
                id,
            },
            StoreError::AlreadyExists { .. } | StoreError::Serialization(_) => {
                Self::InternalInconsistency(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::Collection;

    #[test]
    fn test_store_errors_map_to_taxonomy() {
        assert!(matches!(
            DomainError::from(StoreError::Unavailable("down".into())),
            DomainError::StoreUnavailable(_)
        ));
        assert!(matches!(
            DomainError::from(StoreError::NotFound {
                collection: Collection::Talks,
                id: "t1".into()
            }),
            DomainError::NotFound { kind: "Talk", .. }
        ));
    }

    #[test]
    fn test_user_errors() {
        assert!(DomainError::validation("title is required").is_user_error());
        assert!(!DomainError::StoreUnavailable("x".into()).is_user_error());
        assert!(!DomainError::InternalInconsistency("x".into()).is_user_error());
    }
}
