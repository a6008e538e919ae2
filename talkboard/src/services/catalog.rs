//! Talk catalog: create, edit, list and attach materials.
//!
//! The catalog never writes `registrant_count`. Edits read the talk, apply
//! the patch to that exact revision and commit conditionally, so a
//! registration landing in between makes the edit re-run on fresh data
//! instead of rolling the counter back.

use super::TxError;
use super::ledger::RegistrationLedger;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use std::sync::Arc;
use talkboard_core::document_store::{Collection, DocumentStore, Query};
use talkboard_core::environment::Clock;
use talkboard_core::error::DomainError;
use talkboard_core::ids::{MaterialId, TalkId};
use talkboard_core::model::{Creator, Material, Speaker, Talk, is_valid_email, normalize_email};
use talkboard_core::records::{Record, Versioned, fetch_talk, find};
use talkboard_core::role::Permission;
use talkboard_core::session::SessionContext;
use talkboard_runtime::retry::{RetryPolicy, retry_store};
use tracing::{info, warn};

/// Fields of a new talk.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TalkDraft {
    /// Title.
    pub title: String,
    /// Calendar date.
    pub date: NaiveDate,
    /// Start time.
    pub time: NaiveTime,
    /// Venue.
    pub location: String,
    /// Speaker of record. Defaults to the caller.
    #[serde(default)]
    pub speaker: Option<Speaker>,
    /// Seats.
    pub capacity: u32,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial edit of a talk. `None` leaves a field unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TalkPatch {
    /// New title.
    pub title: Option<String>,
    /// New date.
    pub date: Option<NaiveDate>,
    /// New start time.
    pub time: Option<NaiveTime>,
    /// New venue.
    pub location: Option<String>,
    /// New speaker of record.
    pub speaker: Option<Speaker>,
    /// New capacity. May not drop below the current registrant count.
    pub capacity: Option<u32>,
    /// New description. An empty string clears it.
    pub description: Option<String>,
}

/// A material to attach.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MaterialDraft {
    /// Display name.
    pub name: String,
    /// `http` or `https` link.
    pub url: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Talk CRUD and materials.
#[derive(Clone)]
pub struct TalkCatalog {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    ledger: RegistrationLedger,
}

impl TalkCatalog {
    /// Create a catalog. Deletes and reconciliation go through `ledger`.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        ledger: RegistrationLedger,
    ) -> Self {
        Self {
            store,
            clock,
            retry,
            ledger,
        }
    }

    /// Create a talk with no registrations.
    ///
    /// Without `canEditAnyTalk` the speaker must be the caller.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied`: caller lacks `canCreateTalk`, or names another
    ///   speaker without `canEditAnyTalk`
    /// - `Validation`: missing fields or zero capacity
    /// - `StoreUnavailable`: the store kept failing
    #[tracing::instrument(skip(self, caller, draft), fields(user_id = %caller.user_id, title = %draft.title))]
    pub async fn create_talk(&self, caller: &SessionContext, draft: TalkDraft) -> Result<Talk, DomainError> {
        let permissions = caller.permissions();
        permissions.require(Permission::CreateTalk)?;

        let speaker = match draft.speaker {
            Some(speaker) => clean_speaker(speaker)?,
            None => Speaker {
                name: caller.name.clone(),
                email: caller.email.clone(),
            },
        };
        if speaker.email != caller.email {
            permissions.require(Permission::EditAnyTalk)?;
        }

        let now = self.clock.now();
        let talk = Talk {
            id: TalkId::new(),
            title: required("title", &draft.title)?,
            date: draft.date,
            time: draft.time,
            location: required("location", &draft.location)?,
            speaker,
            capacity: valid_capacity(draft.capacity)?,
            registrant_count: 0,
            description: optional(draft.description),
            materials: Vec::new(),
            creator: Creator {
                user_id: caller.user_id.clone(),
                email: caller.email.clone(),
            },
            created_at: now,
            updated_at: now,
        };

        let op = talk.create_op()?;
        retry_store(&self.retry, "create_talk", || self.store.commit(vec![op.clone()])).await?;
        info!(talk_id = %talk.id, capacity = talk.capacity, "Talk created");
        Ok(talk)
    }

    /// Apply `patch` to a talk the caller may edit.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such talk
    /// - `PermissionDenied`: caller may not edit this talk, or reassigns the
    ///   speaker without `canEditAnyTalk`
    /// - `Validation`: an empty field, zero capacity, or capacity below the
    ///   current registrant count
    /// - `StoreUnavailable`: the store kept failing or the talk kept changing
    #[tracing::instrument(skip(self, caller, patch), fields(talk_id = %talk_id, user_id = %caller.user_id))]
    pub async fn update_talk(
        &self,
        caller: &SessionContext,
        talk_id: TalkId,
        patch: TalkPatch,
    ) -> Result<Talk, DomainError> {
        let patch = &patch;
        let talk = retry_store(&self.retry, "update_talk", move || {
            self.modify(caller, talk_id, move |talk| apply_patch(caller, talk, patch))
        })
        .await?;
        info!("Talk updated");
        Ok(talk)
    }

    /// One talk.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such talk
    /// - `StoreUnavailable`: the store kept failing
    pub async fn get_talk(&self, talk_id: TalkId) -> Result<Talk, DomainError> {
        retry_store(&self.retry, "get_talk", || fetch_talk(self.store.as_ref(), talk_id))
            .await?
            .map(|t| t.value)
            .ok_or_else(|| DomainError::talk_not_found(talk_id))
    }

    /// Every talk, soonest first, each with its counter reconciled.
    ///
    /// A talk whose reconciliation fails is listed with its stored counter.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` if the listing itself cannot be read.
    pub async fn list_talks(&self) -> Result<Vec<Talk>, DomainError> {
        let query = Query::new(Collection::Talks);
        let mut talks: Vec<Talk> = retry_store(&self.retry, "list_talks", || {
            find::<Talk>(self.store.as_ref(), query.clone())
        })
        .await?
        .into_iter()
        .map(|t| t.value)
        .collect();

        for talk in &mut talks {
            match self.ledger.reconcile_count(talk.id).await {
                Ok(count) => talk.registrant_count = count,
                Err(DomainError::NotFound { .. }) => {}
                Err(e) => warn!(talk_id = %talk.id, error = %e, "Listing talk with unreconciled counter"),
            }
        }

        talks.sort_by(|a, b| (a.date, a.time, &a.title).cmp(&(b.date, b.time, &b.title)));
        Ok(talks)
    }

    /// Attach a material to a talk the caller may edit.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such talk
    /// - `PermissionDenied`: caller may not edit this talk
    /// - `Validation`: empty name, or a url that is not `http(s)://`
    /// - `StoreUnavailable`: the store kept failing or the talk kept changing
    #[tracing::instrument(skip(self, caller, draft), fields(talk_id = %talk_id))]
    pub async fn add_material(
        &self,
        caller: &SessionContext,
        talk_id: TalkId,
        draft: MaterialDraft,
    ) -> Result<Material, DomainError> {
        let url = draft.url.trim().to_string();
        if !(url.starts_with("http://") || url.starts_with("https://")) || url.contains(char::is_whitespace) {
            return Err(DomainError::validation("material url must be an http(s) link"));
        }
        let material = Material {
            id: MaterialId::new(),
            name: required("material name", &draft.name)?,
            url,
            description: optional(draft.description),
        };

        let attached = &material;
        retry_store(&self.retry, "add_material", move || {
            self.modify(caller, talk_id, move |talk| {
                talk.materials.push(attached.clone());
                Ok(())
            })
        })
        .await?;
        info!(material_id = %material.id, "Material added");
        Ok(material)
    }

    /// Detach a material.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such talk or material
    /// - `PermissionDenied`: caller may not edit this talk
    /// - `StoreUnavailable`: the store kept failing or the talk kept changing
    #[tracing::instrument(skip(self, caller), fields(talk_id = %talk_id, material_id = %material_id))]
    pub async fn remove_material(
        &self,
        caller: &SessionContext,
        talk_id: TalkId,
        material_id: MaterialId,
    ) -> Result<(), DomainError> {
        retry_store(&self.retry, "remove_material", move || {
            self.modify(caller, talk_id, move |talk| {
                let before = talk.materials.len();
                talk.materials.retain(|m| m.id != material_id);
                if talk.materials.len() == before {
                    return Err(DomainError::NotFound {
                        kind: "Material",
                        id: material_id.to_string(),
                    });
                }
                Ok(())
            })
        })
        .await?;
        info!("Material removed");
        Ok(())
    }

    /// Delete a talk and its registrations. See [`RegistrationLedger::delete_talk`].
    ///
    /// # Errors
    ///
    /// As [`RegistrationLedger::delete_talk`].
    pub async fn delete_talk(&self, caller: &SessionContext, talk_id: TalkId) -> Result<(), DomainError> {
        self.ledger.delete_talk(caller, talk_id).await
    }

    /// Read, check edit access, apply `change`, commit against the revision read.
    async fn modify<F>(&self, caller: &SessionContext, talk_id: TalkId, change: F) -> Result<Talk, TxError>
    where
        F: FnOnce(&mut Talk) -> Result<(), DomainError>,
    {
        let Versioned {
            value: mut talk,
            revision,
        } = fetch_talk(self.store.as_ref(), talk_id)
            .await?
            .ok_or_else(|| DomainError::talk_not_found(talk_id))?;
        caller.access(&talk).require_edit()?;

        change(&mut talk)?;
        talk.updated_at = self.clock.now();
        self.store.commit(vec![talk.update_op(revision)?]).await?;
        Ok(talk)
    }
}

fn apply_patch(caller: &SessionContext, talk: &mut Talk, patch: &TalkPatch) -> Result<(), DomainError> {
    if let Some(title) = &patch.title {
        talk.title = required("title", title)?;
    }
    if let Some(date) = patch.date {
        talk.date = date;
    }
    if let Some(time) = patch.time {
        talk.time = time;
    }
    if let Some(location) = &patch.location {
        talk.location = required("location", location)?;
    }
    if let Some(speaker) = &patch.speaker {
        let speaker = clean_speaker(speaker.clone())?;
        if speaker.email != talk.speaker.email {
            caller.permissions().require(Permission::EditAnyTalk)?;
        }
        talk.speaker = speaker;
    }
    if let Some(capacity) = patch.capacity {
        let capacity = valid_capacity(capacity)?;
        if capacity < talk.registrant_count {
            return Err(DomainError::validation(format!(
                "capacity {capacity} is below the {} current registrations",
                talk.registrant_count
            )));
        }
        talk.capacity = capacity;
    }
    if let Some(description) = &patch.description {
        talk.description = optional(Some(description.clone()));
    }
    Ok(())
}

fn required(field: &str, value: &str) -> Result<String, DomainError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn valid_capacity(capacity: u32) -> Result<u32, DomainError> {
    if capacity == 0 {
        return Err(DomainError::validation("capacity must be at least 1"));
    }
    Ok(capacity)
}

fn clean_speaker(speaker: Speaker) -> Result<Speaker, DomainError> {
    let email = normalize_email(&speaker.email);
    if !is_valid_email(&email) {
        return Err(DomainError::validation(format!("speaker email {email:?} is not valid")));
    }
    Ok(Speaker {
        name: required("speaker name", &speaker.name)?,
        email,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use talkboard_core::model::Participant;
    use talkboard_testing::fixtures::{TalkBuilder, organizer, participant, speaker};
    use talkboard_testing::{InMemoryDocumentStore, test_clock};

    fn catalog(store: &InMemoryDocumentStore) -> TalkCatalog {
        let store: Arc<dyn DocumentStore> = Arc::new(store.clone());
        let clock: Arc<dyn Clock> = Arc::new(test_clock());
        let retry = RetryPolicy::immediate(3);
        let ledger = RegistrationLedger::new(store.clone(), clock.clone(), retry.clone());
        TalkCatalog::new(store, clock, retry, ledger)
    }

    fn draft(title: &str) -> TalkDraft {
        TalkDraft {
            title: title.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 5, 2).unwrap(),
            time: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
            location: "Auditorium".to_string(),
            speaker: None,
            capacity: 40,
            description: Some("  ".to_string()),
        }
    }

    #[tokio::test]
    async fn test_speaker_creates_own_talk_only() {
        let store = InMemoryDocumentStore::new();
        let catalog = catalog(&store);
        let maria = speaker("maria@x.com");

        let talk = catalog.create_talk(&maria, draft("Ownership")).await.unwrap();
        assert_eq!(talk.speaker.email, "maria@x.com");
        assert_eq!(talk.registrant_count, 0);
        assert_eq!(talk.description, None);
        assert!(maria.owns(&talk));

        let mut other = draft("Borrowing");
        other.speaker = Some(Speaker {
            name: "João".to_string(),
            email: "joao@x.com".to_string(),
        });
        let err = catalog.create_talk(&maria, other.clone()).await.unwrap_err();
        assert_eq!(err, DomainError::PermissionDenied { permission: Permission::EditAnyTalk });

        assert!(catalog.create_talk(&organizer(), other).await.is_ok());
    }

    #[tokio::test]
    async fn test_participant_cannot_create() {
        let store = InMemoryDocumentStore::new();
        let err = catalog(&store)
            .create_talk(&participant("a@x.com"), draft("Nope"))
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::PermissionDenied { permission: Permission::CreateTalk });
        assert!(store.is_empty(Collection::Talks));
    }

    #[tokio::test]
    async fn test_create_rejects_zero_capacity() {
        let store = InMemoryDocumentStore::new();
        let mut zero = draft("Zero");
        zero.capacity = 0;
        let err = catalog(&store).create_talk(&organizer(), zero).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_keeps_counter_and_checks_capacity() {
        let store = InMemoryDocumentStore::new();
        let talk = TalkBuilder::new("Rust").capacity(5).insert(&store).await;
        let catalog = catalog(&store);
        for email in ["a@x.com", "b@x.com"] {
            catalog
                .ledger
                .register(&participant(email), talk.id, Participant::new("P", email))
                .await
                .unwrap();
        }

        let err = catalog
            .update_talk(&organizer(), talk.id, TalkPatch { capacity: Some(1), ..TalkPatch::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let updated = catalog
            .update_talk(
                &organizer(),
                talk.id,
                TalkPatch {
                    title: Some("Rust 2025".to_string()),
                    capacity: Some(2),
                    ..TalkPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Rust 2025");
        assert_eq!(updated.capacity, 2);
        assert_eq!(updated.registrant_count, 2);
    }

    #[tokio::test]
    async fn test_only_owner_or_elevated_may_edit() {
        let store = InMemoryDocumentStore::new();
        let talk = TalkBuilder::new("Rust")
            .speaker("Maria", "maria@x.com")
            .insert(&store)
            .await;
        let catalog = catalog(&store);
        let patch = TalkPatch {
            location: Some("Room 2".to_string()),
            ..TalkPatch::default()
        };

        assert!(catalog.update_talk(&speaker("maria@x.com"), talk.id, patch.clone()).await.is_ok());
        let err = catalog
            .update_talk(&speaker("other@x.com"), talk.id, patch)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn test_materials() {
        let store = InMemoryDocumentStore::new();
        let talk = TalkBuilder::new("Rust").insert(&store).await;
        let catalog = catalog(&store);

        let err = catalog
            .add_material(
                &organizer(),
                talk.id,
                MaterialDraft {
                    name: "Slides".to_string(),
                    url: "ftp://x.com/s.pdf".to_string(),
                    description: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let material = catalog
            .add_material(
                &organizer(),
                talk.id,
                MaterialDraft {
                    name: "Slides".to_string(),
                    url: "https://x.com/s.pdf".to_string(),
                    description: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(catalog.get_talk(talk.id).await.unwrap().materials, vec![material.clone()]);

        catalog.remove_material(&organizer(), talk.id, material.id).await.unwrap();
        let err = catalog
            .remove_material(&organizer(), talk.id, material.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { kind: "Material", .. }));
    }

    #[tokio::test]
    async fn test_list_talks_reconciles_and_sorts() {
        let store = InMemoryDocumentStore::new();
        let late = TalkBuilder::new("Late").registrant_count(4).insert(&store).await;
        let mut early = TalkBuilder::new("Early").build();
        early.date = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        store.commit(vec![early.create_op().unwrap()]).await.unwrap();

        let talks = catalog(&store).list_talks().await.unwrap();
        assert_eq!(talks.iter().map(|t| t.title.as_str()).collect::<Vec<_>>(), ["Early", "Late"]);
        assert_eq!(talks[1].id, late.id);
        assert_eq!(talks[1].registrant_count, 0);
        assert_eq!(
            fetch_talk(&store, late.id).await.unwrap().unwrap().value.registrant_count,
            0
        );
    }
}
