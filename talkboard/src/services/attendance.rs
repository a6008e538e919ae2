//! Attendance Tracker.
//!
//! One boolean per registration. Marking is allowed to organizers and
//! administrators on any talk, and to speakers on talks they own.

use super::TxError;
use std::sync::Arc;
use talkboard_core::document_store::DocumentStore;
use talkboard_core::environment::Clock;
use talkboard_core::error::DomainError;
use talkboard_core::ids::RegistrationId;
use talkboard_core::model::Registration;
use talkboard_core::records::{Record, Versioned, fetch, fetch_talk};
use talkboard_core::session::SessionContext;
use talkboard_runtime::metrics::LedgerMetrics;
use talkboard_runtime::retry::{RetryPolicy, retry_store};
use tracing::{info, warn};

/// Sets attendance flags.
#[derive(Clone)]
pub struct AttendanceTracker {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl AttendanceTracker {
    /// Create a tracker over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self { store, clock, retry }
    }

    /// Set the attendance flag of a registration and return the result.
    ///
    /// Setting the value it already has writes nothing. Clearing a flag
    /// makes certificates for that registration stop validating.
    ///
    /// # Errors
    ///
    /// - `RegistrationNotFound`: no such registration
    /// - `NotFound`: the registration's talk is gone
    /// - `PermissionDenied`: caller may not mark attendance on that talk
    /// - `StoreUnavailable`: the store kept failing
    #[tracing::instrument(skip(self, caller), fields(registration_id = %registration_id, user_id = %caller.user_id))]
    pub async fn set_attendance(
        &self,
        caller: &SessionContext,
        registration_id: RegistrationId,
        present: bool,
    ) -> Result<Registration, DomainError> {
        let (registration, changed) = retry_store(&self.retry, "set_attendance", || {
            self.try_set(caller, registration_id, present)
        })
        .await?;

        if changed {
            LedgerMetrics::record_attendance(present);
            if present {
                info!(talk_id = %registration.talk_id, "Attendance confirmed");
            } else {
                warn!(
                    talk_id = %registration.talk_id,
                    email = %registration.email,
                    "Attendance withdrawn; certificates for this registration no longer validate"
                );
            }
        }
        Ok(registration)
    }

    async fn try_set(
        &self,
        caller: &SessionContext,
        registration_id: RegistrationId,
        present: bool,
    ) -> Result<(Registration, bool), TxError> {
        let Versioned {
            value: mut registration,
            revision,
        } = fetch::<Registration>(self.store.as_ref(), &registration_id.to_string())
            .await?
            .ok_or_else(|| DomainError::RegistrationNotFound(registration_id.to_string()))?;

        let talk = fetch_talk(self.store.as_ref(), registration.talk_id)
            .await?
            .ok_or_else(|| DomainError::talk_not_found(registration.talk_id))?;
        caller.access(&talk.value).require_attendance()?;

        if registration.attended == present {
            return Ok((registration, false));
        }

        registration.attended = present;
        registration.attendance_updated_at = Some(self.clock.now());
        self.store
            .commit(vec![registration.update_op(revision)?])
            .await?;
        Ok((registration, true))
    }
}
