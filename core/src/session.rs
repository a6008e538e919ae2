//! The authenticated caller, passed into every service call.

use crate::ids::UserId;
use crate::model::{Talk, normalize_email};
use crate::role::{Permissions, Role, TalkAccess, permissions_for};
use serde::{Deserialize, Serialize};

/// Who is calling, with the role read when the session was established.
///
/// A role change takes effect on the user's next login.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// User id.
    pub user_id: UserId,
    /// Display name.
    pub name: String,
    /// Normalized email.
    pub email: String,
    /// Role at session establishment.
    pub role: Role,
}

impl SessionContext {
    /// Build a context, normalizing the email.
    #[must_use]
    pub fn new(user_id: UserId, name: impl Into<String>, email: &str, role: Role) -> Self {
        Self {
            user_id,
            name: name.into(),
            email: normalize_email(email),
            role,
        }
    }

    /// Global permissions for this session's role.
    #[must_use]
    pub const fn permissions(&self) -> Permissions {
        permissions_for(self.role)
    }

    /// Whether the caller created the talk or is its speaker of record.
    #[must_use]
    pub fn owns(&self, talk: &Talk) -> bool {
        talk.creator.user_id == self.user_id || talk.speaker.email == self.email
    }

    /// Talk-scoped access for this caller.
    #[must_use]
    pub fn access(&self, talk: &Talk) -> TalkAccess {
        self.permissions().for_talk(self.owns(talk))
    }

    /// Whether `email` (any casing) is the caller's own.
    #[must_use]
    pub fn is_self(&self, email: &str) -> bool {
        normalize_email(email) == self.email
    }
}
