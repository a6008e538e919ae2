//! # Talkboard Testing
//!
//! Test doubles and fixtures for the talkboard services.
//!
//! This crate provides:
//! - [`InMemoryDocumentStore`]: a complete document store with fault injection
//! - [`FixedClock`] and [`test_clock`]: deterministic time
//! - [`fixtures`]: talk builders and ready-made sessions for each role
//! - [`properties`]: proptest strategies for emails and participants
//!
//! ## Example
//!
//! ```ignore
//! use talkboard_testing::{InMemoryDocumentStore, test_clock, fixtures::{TalkBuilder, participant}};
//!
//! #[tokio::test]
//! async fn test_last_seat() {
//!     let store = InMemoryDocumentStore::new();
//!     let talk = TalkBuilder::new("Rust").capacity(1).insert(&store).await;
//!
//!     let ledger = RegistrationLedger::new(Arc::new(store), Arc::new(test_clock()), RetryPolicy::immediate(3));
//!     let ana = participant("ana@example.com");
//!     ledger.register(&ana, talk.id, Participant::new("Ana", "ana@example.com")).await.unwrap();
//! }
//! ```

use chrono::{DateTime, Utc};
use talkboard_core::environment::Clock;

/// In-memory document store
pub mod document_store;

pub use document_store::InMemoryDocumentStore;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use talkboard_testing::mocks::FixedClock;
    /// use talkboard_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to. Used for session expiry tests.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Start at `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: chrono::Duration) {
            if let Ok(mut time) = self.time.lock() {
                *time += by;
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.time.lock().map_or_else(|e| *e.into_inner(), |t| *t)
        }
    }

    /// The instant every test clock starts at (2025-01-01 00:00:00 UTC).
    #[must_use]
    pub fn test_instant() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_instant())
    }
}

/// Builders and canned sessions.
pub mod fixtures {
    use crate::mocks::test_instant;
    use chrono::{NaiveDate, NaiveTime};
    use talkboard_core::document_store::DocumentStore;
    use talkboard_core::ids::{TalkId, UserId};
    use talkboard_core::model::{Creator, Speaker, Talk, normalize_email};
    use talkboard_core::records::Record;
    use talkboard_core::role::Role;
    use talkboard_core::session::SessionContext;

    /// Builder for talk records.
    ///
    /// Defaults: capacity 30, speaker `speaker@example.com`, created by
    /// `organizer-1`.
    #[derive(Clone, Debug)]
    pub struct TalkBuilder {
        talk: Talk,
    }

    impl TalkBuilder {
        /// Start a talk titled `title`.
        #[must_use]
        pub fn new(title: &str) -> Self {
            let at = test_instant();
            Self {
                talk: Talk {
                    id: TalkId::new(),
                    title: title.to_string(),
                    date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap_or_default(),
                    time: NaiveTime::from_hms_opt(19, 0, 0).unwrap_or_default(),
                    location: "Room 1".to_string(),
                    speaker: Speaker {
                        name: "Speaker".to_string(),
                        email: "speaker@example.com".to_string(),
                    },
                    capacity: 30,
                    registrant_count: 0,
                    description: None,
                    materials: Vec::new(),
                    creator: Creator {
                        user_id: UserId::new("organizer-1"),
                        email: "organizer@example.com".to_string(),
                    },
                    created_at: at,
                    updated_at: at,
                },
            }
        }

        /// Set the capacity.
        #[must_use]
        pub const fn capacity(mut self, capacity: u32) -> Self {
            self.talk.capacity = capacity;
            self
        }

        /// Set the stored registrant counter (to simulate drift).
        #[must_use]
        pub const fn registrant_count(mut self, count: u32) -> Self {
            self.talk.registrant_count = count;
            self
        }

        /// Set the speaker.
        #[must_use]
        pub fn speaker(mut self, name: &str, email: &str) -> Self {
            self.talk.speaker = Speaker {
                name: name.to_string(),
                email: normalize_email(email),
            };
            self
        }

        /// Set the creator.
        #[must_use]
        pub fn created_by(mut self, session: &SessionContext) -> Self {
            self.talk.creator = Creator {
                user_id: session.user_id.clone(),
                email: session.email.clone(),
            };
            self
        }

        /// Finish without storing.
        #[must_use]
        pub fn build(self) -> Talk {
            self.talk
        }

        /// Store the talk and return it.
        ///
        /// # Panics
        ///
        /// Panics if the store rejects the write.
        #[allow(clippy::expect_used)]
        pub async fn insert(self, store: &dyn DocumentStore) -> Talk {
            let op = self.talk.create_op().expect("talk encodes");
            store.commit(vec![op]).await.expect("talk stored");
            self.talk
        }
    }

    fn session(id: &str, email: &str, role: Role) -> SessionContext {
        SessionContext::new(UserId::new(id), id, email, role)
    }

    /// An administrator.
    #[must_use]
    pub fn admin() -> SessionContext {
        session("admin-1", "admin@example.com", Role::Administrator)
    }

    /// An organizer. Matches the default creator of [`TalkBuilder`].
    #[must_use]
    pub fn organizer() -> SessionContext {
        session("organizer-1", "organizer@example.com", Role::Organizer)
    }

    /// A speaker with the given email.
    #[must_use]
    pub fn speaker(email: &str) -> SessionContext {
        session(&format!("speaker:{email}"), email, Role::Speaker)
    }

    /// A participant with the given email.
    #[must_use]
    pub fn participant(email: &str) -> SessionContext {
        session(&format!("participant:{email}"), email, Role::Participant)
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use talkboard_core::model::Participant;

    /// Valid, already-normalized email addresses.
    pub fn email() -> impl Strategy<Value = String> {
        ("[a-z][a-z0-9]{0,8}", "[a-z]{2,8}").prop_map(|(local, domain)| format!("{local}@{domain}.com"))
    }

    /// Participants with valid emails.
    pub fn participant() -> impl Strategy<Value = Participant> {
        ("[A-Z][a-z]{1,8}", email()).prop_map(|(name, email)| Participant::new(name, email))
    }
}

pub use mocks::{FixedClock, ManualClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(mocks::test_instant());
        let before = clock.now();
        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(clock.now() - before, chrono::Duration::minutes(5));
    }

    #[test]
    fn test_builder_defaults_match_organizer_fixture() {
        let talk = fixtures::TalkBuilder::new("Rust").build();
        assert!(fixtures::organizer().owns(&talk));
        assert!(!fixtures::participant("ana@example.com").owns(&talk));
    }
}
