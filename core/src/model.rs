//! Talks, registrations and users.
//!
//! Records are stored as JSON documents. Field names here are the stored
//! field names, so renaming a field is a data migration.

use crate::ids::{MaterialId, RegistrationId, TalkId, UserId};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalize an email for comparison and storage (trim + lowercase).
///
/// # Examples
///
/// ```
/// use talkboard_core::model::normalize_email;
///
/// assert_eq!(normalize_email("  Maria@X.com "), "maria@x.com");
/// ```
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Minimal structural email check: one `@`, non-empty local part, dotted domain.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

/// The person presenting a talk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speaker {
    /// Display name.
    pub name: String,
    /// Normalized email.
    pub email: String,
}

/// Who created a talk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    /// Creating user.
    pub user_id: UserId,
    /// Normalized email of the creating user.
    pub email: String,
}

/// A named link attached to a talk (slides, repository, recording).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    /// Material id, unique within the talk.
    pub id: MaterialId,
    /// Display name.
    pub name: String,
    /// Link target.
    pub url: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A talk participants register for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Talk {
    /// Talk id.
    pub id: TalkId,
    /// Title.
    pub title: String,
    /// Calendar date.
    pub date: NaiveDate,
    /// Start time.
    pub time: NaiveTime,
    /// Venue.
    pub location: String,
    /// Speaker of record.
    pub speaker: Speaker,
    /// Maximum number of registrations.
    pub capacity: u32,
    /// Denormalized count of registrations referencing this talk.
    pub registrant_count: u32,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Attached materials.
    #[serde(default)]
    pub materials: Vec<Material>,
    /// Creator identity.
    pub creator: Creator,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Talk {
    /// Seats still available according to the stored counter.
    #[must_use]
    pub const fn seats_left(&self) -> u32 {
        self.capacity.saturating_sub(self.registrant_count)
    }

    /// Whether `email` (normalized) belongs to the speaker or the creator.
    #[must_use]
    pub fn is_presented_by(&self, email: &str) -> bool {
        self.speaker.email == email || self.creator.email == email
    }
}

/// Name and email of someone registering for a talk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Display name.
    pub name: String,
    /// Email (normalized by the ledger before use).
    pub email: String,
}

impl Participant {
    /// Create a participant.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// The join record between a participant and a talk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Registration id.
    pub id: RegistrationId,
    /// Owning talk.
    pub talk_id: TalkId,
    /// Participant display name.
    pub name: String,
    /// Normalized participant email.
    pub email: String,
    /// Attendance confirmed.
    #[serde(default)]
    pub attended: bool,
    /// When the participant registered.
    pub registered_at: DateTime<Utc>,
    /// When the attendance flag last changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendance_updated_at: Option<DateTime<Utc>>,
}

impl Registration {
    /// New registration with attendance unconfirmed.
    #[must_use]
    pub fn new(talk_id: TalkId, name: String, email: String, registered_at: DateTime<Utc>) -> Self {
        Self {
            id: RegistrationId::for_participant(talk_id, &email),
            talk_id,
            name,
            email,
            attended: false,
            registered_at,
            attendance_updated_at: None,
        }
    }
}

/// An account created on first login.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Provider subject id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Normalized email.
    pub email: String,
    /// Stored role value. Parsed through [`Role::parse`](crate::role::Role::parse)
    /// at session establishment.
    pub role: String,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last@sub.example.org"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("@x.com"));
        assert!(!is_valid_email("a@@x.com"));
        assert!(!is_valid_email("a b@x.com"));
        assert!(!is_valid_email("a@.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_registration_id_follows_email() {
        let talk_id = TalkId::new();
        let reg = Registration::new(talk_id, "A".into(), "a@x.com".into(), Utc::now());
        assert_eq!(reg.id, RegistrationId::for_participant(talk_id, "a@x.com"));
        assert!(!reg.attended);
    }
}
