//! Registration Ledger.
//!
//! Owns every write to `registrations` and to `Talk::registrant_count`.
//! A registration and the counter of its talk always change in the same
//! commit, conditional on the talk revision that was read:
//!
//! ```text
//! read talk (rev r) ─> checks ─> count registrations ─> commit [talk@r, registration]
//!                                                          │
//!                           conflict (someone else won) <──┘ re-read and re-check
//! ```
//!
//! Two participants racing for the last seat both read `r`; one commit lands,
//! the other conflicts, re-reads, and fails with `CapacityExceeded`.

use super::TxError;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use talkboard_core::document_store::{Collection, DocumentStore, Query, StoreError, WriteOp};
use talkboard_core::environment::Clock;
use talkboard_core::error::DomainError;
use talkboard_core::ids::{RegistrationId, TalkId};
use talkboard_core::model::{Participant, Registration, Talk, is_valid_email, normalize_email};
use talkboard_core::records::{
    Record, Versioned, decode_all, fetch, fetch_talk, find, registrations_by, registrations_of,
};
use talkboard_core::role::Permission;
use talkboard_core::session::SessionContext;
use talkboard_core::subscription::Snapshot;
use talkboard_runtime::metrics::LedgerMetrics;
use talkboard_runtime::retry::{RetryPolicy, retry_store};
use tracing::{debug, info, warn};

/// Registrations removed per commit when a talk is deleted.
pub const CASCADE_BATCH: usize = 100;

/// Attendance totals of one roster.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RosterTotals {
    /// Registrations.
    pub registered: u32,
    /// Registrations with attendance confirmed.
    pub present: u32,
    /// Registrations without attendance confirmed.
    pub absent: u32,
}

impl RosterTotals {
    /// Totals over `registrations`.
    #[must_use]
    pub fn of(registrations: &[Registration]) -> Self {
        let registered = count_u32(registrations.len());
        let present = count_u32(registrations.iter().filter(|r| r.attended).count());
        Self {
            registered,
            present,
            absent: registered - present,
        }
    }
}

/// A talk with everyone registered for it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Roster {
    /// The talk, with its counter as reconciled.
    pub talk: Talk,
    /// Registrations, oldest first.
    pub registrations: Vec<Registration>,
    /// Totals.
    pub totals: RosterTotals,
}

/// One entry of a participant's dashboard.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParticipantRegistration {
    /// The registration.
    pub registration: Registration,
    /// Its talk. `None` for a registration left behind by a deleted talk.
    pub talk: Option<Talk>,
}

/// Live registration set, as `(store sequence, registrations)`.
pub type RegistrationFeed =
    std::pin::Pin<Box<dyn Stream<Item = Result<(u64, Vec<Registration>), DomainError>> + Send>>;

/// Keeps talks, registrations and registrant counters consistent.
#[derive(Clone)]
pub struct RegistrationLedger {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl RegistrationLedger {
    /// Create a ledger over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self { store, clock, retry }
    }

    /// Register `participant` for a talk.
    ///
    /// Registering any email other than the caller's own requires
    /// `canEditAnyTalk`.
    ///
    /// # Errors
    ///
    /// - `Validation`: empty name or malformed email
    /// - `PermissionDenied`: registering someone else without `canEditAnyTalk`
    /// - `NotFound`: no such talk
    /// - `DuplicateRegistration`: the email already holds a registration here
    /// - `SelfRegistrationForbidden`: the email is the talk's speaker or creator
    /// - `CapacityExceeded`: no seats left
    /// - `StoreUnavailable`: the store kept failing or the talk kept changing
    #[tracing::instrument(skip(self, caller, participant), fields(talk_id = %talk_id, email = %participant.email))]
    pub async fn register(
        &self,
        caller: &SessionContext,
        talk_id: TalkId,
        participant: Participant,
    ) -> Result<RegistrationId, DomainError> {
        let result = self.register_checked(caller, talk_id, participant).await;
        LedgerMetrics::record_registration(outcome(&result));
        result
    }

    async fn register_checked(
        &self,
        caller: &SessionContext,
        talk_id: TalkId,
        participant: Participant,
    ) -> Result<RegistrationId, DomainError> {
        let email = normalize_email(&participant.email);
        let name = participant.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("participant name is required"));
        }
        if !is_valid_email(&email) {
            return Err(DomainError::validation(format!("{email:?} is not a valid email")));
        }
        if !caller.is_self(&email) {
            caller.permissions().require(Permission::EditAnyTalk)?;
        }

        let id = retry_store(&self.retry, "register", || {
            self.try_register(talk_id, &name, &email)
        })
        .await?;
        Ok(id)
    }

    async fn try_register(
        &self,
        talk_id: TalkId,
        name: &str,
        email: &str,
    ) -> Result<RegistrationId, TxError> {
        let Versioned {
            value: mut talk,
            revision,
        } = fetch_talk(self.store.as_ref(), talk_id)
            .await?
            .ok_or_else(|| DomainError::talk_not_found(talk_id))?;

        let registration =
            Registration::new(talk_id, name.to_string(), email.to_string(), self.clock.now());
        let duplicate = || DomainError::DuplicateRegistration {
            talk_id,
            email: email.to_string(),
        };

        if self
            .store
            .get(Collection::Registrations, &registration.document_id())
            .await?
            .is_some()
        {
            return Err(duplicate().into());
        }
        if talk.is_presented_by(email) {
            return Err(DomainError::SelfRegistrationForbidden {
                talk_id,
                email: email.to_string(),
            }
            .into());
        }

        let stored = talk.registrant_count;
        let actual = self.count_registrations(talk_id).await?;
        if actual >= talk.capacity {
            return Err(DomainError::CapacityExceeded {
                talk_id,
                capacity: talk.capacity,
            }
            .into());
        }

        talk.registrant_count = actual + 1;
        let writes = vec![talk.update_op(revision)?, registration.create_op()?];
        match self.store.commit(writes).await {
            Ok(_) => {}
            Err(StoreError::AlreadyExists { .. }) => return Err(duplicate().into()),
            Err(e) => return Err(e.into()),
        }

        // The talk revision held, so `actual` was exact when the commit landed.
        if stored != actual {
            warn!(stored, actual, "Corrected registrant count while registering");
            LedgerMetrics::record_drift("register");
        }
        info!(
            registration_id = %registration.id,
            registrants = talk.registrant_count,
            capacity = talk.capacity,
            "Participant registered"
        );
        Ok(registration.id)
    }

    /// Cancel the registration of `participant_email` for a talk.
    ///
    /// Cancelling someone else's registration requires `canEditAnyTalk`.
    /// The registration delete and the counter decrement are one commit.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied`: cancelling someone else without `canEditAnyTalk`
    /// - `RegistrationNotFound`: nothing to cancel
    /// - `StoreUnavailable`: the store kept failing or the talk kept changing
    #[tracing::instrument(skip(self, caller), fields(talk_id = %talk_id, email = %participant_email))]
    pub async fn cancel(
        &self,
        caller: &SessionContext,
        talk_id: TalkId,
        participant_email: &str,
    ) -> Result<(), DomainError> {
        let email = normalize_email(participant_email);
        if !caller.is_self(&email) {
            caller.permissions().require(Permission::EditAnyTalk)?;
        }

        retry_store(&self.retry, "cancel", || self.try_cancel(talk_id, &email)).await?;
        LedgerMetrics::record_cancellation();
        Ok(())
    }

    async fn try_cancel(&self, talk_id: TalkId, email: &str) -> Result<(), TxError> {
        let id = RegistrationId::for_participant(talk_id, email);
        let Some(registration) = fetch::<Registration>(self.store.as_ref(), &id.to_string()).await?
        else {
            return Err(DomainError::RegistrationNotFound(format!("{email} in talk {talk_id}")).into());
        };

        let mut writes = vec![registration.value.delete_op(registration.revision)];
        let mut corrected = None;

        match fetch_talk(self.store.as_ref(), talk_id).await? {
            Some(Versioned {
                value: mut talk,
                revision,
            }) => {
                let actual = self.count_registrations(talk_id).await?;
                if talk.registrant_count != actual {
                    corrected = Some((talk.registrant_count, actual));
                }
                talk.registrant_count = actual.saturating_sub(1);
                writes.push(talk.update_op(revision)?);
            }
            None => warn!("Cancelling a registration whose talk no longer exists"),
        }

        self.store.commit(writes).await?;

        if let Some((stored, actual)) = corrected {
            warn!(stored, actual, "Corrected registrant count while cancelling");
            LedgerMetrics::record_drift("cancel");
        }
        info!(registration_id = %id, "Registration cancelled");
        Ok(())
    }

    /// Recount the registrations of a talk and persist the count if the
    /// stored counter disagrees. Returns the true count.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such talk
    /// - `InternalInconsistency`: the correction kept conflicting
    /// - `StoreUnavailable`: the store kept failing
    #[tracing::instrument(skip(self), fields(talk_id = %talk_id))]
    pub async fn reconcile_count(&self, talk_id: TalkId) -> Result<u32, DomainError> {
        retry_store(&self.retry, "reconcile_count", || self.try_reconcile(talk_id))
            .await
            .map_err(|err| match err {
                TxError::Store(e) if e.is_conflict() => DomainError::InternalInconsistency(format!(
                    "registrant count of talk {talk_id} could not be corrected: {e}"
                )),
                other => other.into(),
            })
    }

    async fn try_reconcile(&self, talk_id: TalkId) -> Result<u32, TxError> {
        let Versioned {
            value: mut talk,
            revision,
        } = fetch_talk(self.store.as_ref(), talk_id)
            .await?
            .ok_or_else(|| DomainError::talk_not_found(talk_id))?;

        let actual = self.count_registrations(talk_id).await?;
        if talk.registrant_count == actual {
            return Ok(actual);
        }

        let stored = talk.registrant_count;
        talk.registrant_count = actual;
        self.store.commit(vec![talk.update_op(revision)?]).await?;

        warn!(stored, actual, "Reconciled registrant count");
        LedgerMetrics::record_drift("reconcile");
        Ok(actual)
    }

    /// Delete a talk and every registration referencing it.
    ///
    /// Registrations go first, in batches of [`CASCADE_BATCH`], each batch
    /// committed together with the lowered counter. The talk itself is
    /// deleted last, conditional on its revision, so a registration that
    /// slips in meanwhile sends the whole cascade round again. Interrupted
    /// runs leave a consistent talk behind and can simply be repeated.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied`: caller lacks `canEditAnyTalk`
    /// - `NotFound`: the talk does not exist (orphaned registrations are
    ///   still removed)
    /// - `StoreUnavailable`: the store kept failing or the talk kept changing
    #[tracing::instrument(skip(self, caller), fields(talk_id = %talk_id, user_id = %caller.user_id))]
    pub async fn delete_talk(&self, caller: &SessionContext, talk_id: TalkId) -> Result<(), DomainError> {
        caller.permissions().require(Permission::EditAnyTalk)?;
        retry_store(&self.retry, "delete_talk", || self.try_delete_talk(talk_id)).await?;
        Ok(())
    }

    async fn try_delete_talk(&self, talk_id: TalkId) -> Result<(), TxError> {
        let mut swept = 0usize;

        let talk = loop {
            let talk = fetch_talk(self.store.as_ref(), talk_id).await?;
            let registrations: Vec<Versioned<Registration>> =
                find(self.store.as_ref(), registrations_of(talk_id)).await?;
            if registrations.is_empty() {
                break talk;
            }

            let batch = registrations.len().min(CASCADE_BATCH);
            let remaining = registrations.len() - batch;
            let mut writes: Vec<WriteOp> = registrations[..batch]
                .iter()
                .map(|r| r.value.delete_op(r.revision))
                .collect();
            if let Some(Versioned {
                value: mut talk,
                revision,
            }) = talk
            {
                talk.registrant_count = count_u32(remaining);
                writes.push(talk.update_op(revision)?);
            }

            self.store.commit(writes).await?;
            swept += batch;
            debug!(batch, remaining, "Removed registration batch");
        };

        let Some(talk) = talk else {
            if swept > 0 {
                warn!(swept, "Removed registrations left behind by a deleted talk");
            }
            return Err(DomainError::talk_not_found(talk_id).into());
        };

        self.store
            .commit(vec![talk.value.delete_op(talk.revision)])
            .await?;
        info!(registrations = swept, "Talk deleted");
        Ok(())
    }

    /// The roster of a talk with attendance totals.
    ///
    /// A counter found out of step with the roster is reconciled on the way.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such talk
    /// - `PermissionDenied`: caller may not view this roster
    /// - `StoreUnavailable`: the store kept failing
    pub async fn roster(&self, caller: &SessionContext, talk_id: TalkId) -> Result<Roster, DomainError> {
        let (mut talk, mut registrations) =
            retry_store(&self.retry, "roster", || self.load_roster(talk_id)).await?;
        caller.access(&talk).require_roster()?;

        registrations.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.email.cmp(&b.email))
        });
        let totals = RosterTotals::of(&registrations);

        if talk.registrant_count != totals.registered {
            match self.reconcile_count(talk_id).await {
                Ok(count) => talk.registrant_count = count,
                Err(e) => warn!(talk_id = %talk_id, error = %e, "Roster shows a stale counter"),
            }
        }

        Ok(Roster {
            talk,
            registrations,
            totals,
        })
    }

    async fn load_roster(&self, talk_id: TalkId) -> Result<(Talk, Vec<Registration>), TxError> {
        let talk = fetch_talk(self.store.as_ref(), talk_id)
            .await?
            .ok_or_else(|| DomainError::talk_not_found(talk_id))?;
        let registrations = find::<Registration>(self.store.as_ref(), registrations_of(talk_id))
            .await?
            .into_iter()
            .map(|r| r.value)
            .collect();
        Ok((talk.value, registrations))
    }

    /// Every registration held by `email`, with its talk, soonest talk first.
    ///
    /// Looking at someone else's registrations requires `canViewAllRosters`.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied`: another email without `canViewAllRosters`
    /// - `StoreUnavailable`: the store kept failing
    pub async fn registrations_for(
        &self,
        caller: &SessionContext,
        email: &str,
    ) -> Result<Vec<ParticipantRegistration>, DomainError> {
        let email = normalize_email(email);
        if !caller.is_self(&email) {
            caller.permissions().require(Permission::ViewAllRosters)?;
        }

        let mut entries =
            retry_store(&self.retry, "registrations_for", || self.load_participant(&email)).await?;
        entries.sort_by_key(|e| e.talk.as_ref().map(|t| (t.date, t.time)));
        Ok(entries)
    }

    async fn load_participant(&self, email: &str) -> Result<Vec<ParticipantRegistration>, TxError> {
        let registrations = find::<Registration>(self.store.as_ref(), registrations_by(email)).await?;
        let mut entries = Vec::with_capacity(registrations.len());
        for registration in registrations {
            let talk = fetch_talk(self.store.as_ref(), registration.value.talk_id)
                .await?
                .map(|t| t.value);
            entries.push(ParticipantRegistration {
                registration: registration.value,
                talk,
            });
        }
        Ok(entries)
    }

    /// Live registrations of a talk, for anyone allowed to see its roster.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such talk
    /// - `PermissionDenied`: caller may not view this roster
    /// - `StoreUnavailable`: the subscription could not be set up
    pub async fn subscribe_talk(
        &self,
        caller: &SessionContext,
        talk_id: TalkId,
    ) -> Result<RegistrationFeed, DomainError> {
        let talk = fetch_talk(self.store.as_ref(), talk_id)
            .await?
            .ok_or_else(|| DomainError::talk_not_found(talk_id))?;
        caller.access(&talk.value).require_roster()?;

        debug!(talk_id = %talk_id, "Subscribing to talk registrations");
        self.feed(registrations_of(talk_id)).await
    }

    /// Live registrations held by `email`.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied`: another email without `canViewAllRosters`
    /// - `StoreUnavailable`: the subscription could not be set up
    pub async fn subscribe_participant(
        &self,
        caller: &SessionContext,
        email: &str,
    ) -> Result<RegistrationFeed, DomainError> {
        let email = normalize_email(email);
        if !caller.is_self(&email) {
            caller.permissions().require(Permission::ViewAllRosters)?;
        }
        self.feed(registrations_by(&email)).await
    }

    async fn feed(&self, query: Query) -> Result<RegistrationFeed, DomainError> {
        let snapshots = self.store.subscribe(query).await?;
        Ok(Box::pin(snapshots.map(
            |item: Result<Snapshot, StoreError>| -> Result<(u64, Vec<Registration>), DomainError> {
                let snapshot = item?;
                let registrations = decode_all::<Registration>(snapshot.documents)?;
                Ok((snapshot.sequence, registrations))
            },
        )))
    }

    async fn count_registrations(&self, talk_id: TalkId) -> Result<u32, StoreError> {
        let documents = self.store.query(registrations_of(talk_id)).await?;
        Ok(count_u32(documents.len()))
    }
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

const fn outcome(result: &Result<RegistrationId, DomainError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(DomainError::CapacityExceeded { .. }) => "capacity_exceeded",
        Err(DomainError::DuplicateRegistration { .. }) => "duplicate",
        Err(DomainError::SelfRegistrationForbidden { .. }) => "self_registration",
        Err(DomainError::PermissionDenied { .. }) => "permission_denied",
        Err(DomainError::Validation(_)) => "invalid",
        Err(DomainError::NotFound { .. }) => "not_found",
        Err(DomainError::StoreUnavailable(_)) => "unavailable",
        Err(_) => "error",
    }
}
