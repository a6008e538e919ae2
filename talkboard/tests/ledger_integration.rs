//! Integration tests for the registration ledger, attendance and certificates
//! over the in-memory document store.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use futures::StreamExt;
use proptest::prelude::*;
use std::sync::Arc;
use talkboard::services::Services;
use talkboard::services::ledger::CASCADE_BATCH;
use talkboard::services::certificates::InvalidReason;
use talkboard::{Config, TalkboardApp};
use talkboard_core::document_store::{Collection, DocumentStore};
use talkboard_core::error::DomainError;
use talkboard_core::ids::RegistrationId;
use talkboard_core::model::{Participant, Talk};
use talkboard_core::records::{Record, fetch_talk};
use talkboard_testing::fixtures::{TalkBuilder, admin, organizer, participant, speaker};
use talkboard_testing::{InMemoryDocumentStore, properties, test_clock};

fn services_with(store: &InMemoryDocumentStore, config: Config) -> Services {
    TalkboardApp::assemble(config, Arc::new(store.clone()), None, Arc::new(test_clock())).services
}

fn services(store: &InMemoryDocumentStore) -> Services {
    services_with(store, Config::local())
}

async fn stored_count(store: &InMemoryDocumentStore, talk: &Talk) -> u32 {
    fetch_talk(store, talk.id).await.unwrap().unwrap().value.registrant_count
}

#[tokio::test]
async fn test_register_attend_and_certify() {
    let store = InMemoryDocumentStore::new();
    let services = services(&store);
    let talk = TalkBuilder::new("Ownership in practice")
        .speaker("Grace", "grace@example.com")
        .insert(&store)
        .await;
    let ana = participant("ana@example.com");

    let registration_id = services
        .ledger
        .register(&ana, talk.id, Participant::new("Ana", "ana@example.com"))
        .await
        .unwrap();
    assert_eq!(registration_id, RegistrationId::for_participant(talk.id, "ana@example.com"));

    let check = services.certificates.validate(talk.id, "ana@example.com").await.unwrap();
    assert!(!check.valid);
    assert_eq!(check.reason, Some(InvalidReason::NotAttended));

    services
        .attendance
        .set_attendance(&speaker("grace@example.com"), registration_id, true)
        .await
        .unwrap();

    let check = services.certificates.validate(talk.id, "ana@example.com").await.unwrap();
    assert!(check.valid);
    let certificate = check.certificate.unwrap();
    assert_eq!(certificate.talk_title, "Ownership in practice");
    assert_eq!(certificate.speaker_name, "Grace");
    assert_eq!(certificate.participant_name, "Ana");

    let roster = services.ledger.roster(&organizer(), talk.id).await.unwrap();
    assert_eq!(roster.totals.registered, 1);
    assert_eq!(roster.totals.present, 1);
    assert_eq!(roster.totals.absent, 0);
}

#[tokio::test]
async fn test_cancel_frees_the_seat() {
    let store = InMemoryDocumentStore::new();
    let services = services(&store);
    let talk = TalkBuilder::new("Full house").capacity(1).insert(&store).await;
    let ana = participant("ana@example.com");
    let bia = participant("bia@example.com");

    services
        .ledger
        .register(&ana, talk.id, Participant::new("Ana", "ana@example.com"))
        .await
        .unwrap();
    let err = services
        .ledger
        .register(&bia, talk.id, Participant::new("Bia", "bia@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::CapacityExceeded { capacity: 1, .. }));

    services.ledger.cancel(&ana, talk.id, "ANA@example.com").await.unwrap();
    assert_eq!(stored_count(&store, &talk).await, 0);

    services
        .ledger
        .register(&bia, talk.id, Participant::new("Bia", "bia@example.com"))
        .await
        .unwrap();
    assert_eq!(stored_count(&store, &talk).await, 1);

    let err = services.ledger.cancel(&ana, talk.id, "ana@example.com").await.unwrap_err();
    assert!(matches!(err, DomainError::RegistrationNotFound(_)));
}

#[tokio::test]
async fn test_last_seat_goes_to_exactly_one_contender() {
    let store = InMemoryDocumentStore::new();
    let mut config = Config::local();
    config.store.max_retries = 64;
    config.store.retry_initial_ms = 0;
    let services = services_with(&store, config);
    let talk = TalkBuilder::new("Last seat").capacity(1).insert(&store).await;
    let talk_id = talk.id;

    let contenders: Vec<_> = (0..16)
        .map(|i| {
            let ledger = services.ledger.clone();
            let email = format!("p{i}@example.com");
            tokio::spawn(async move {
                let caller = participant(&email);
                ledger
                    .register(&caller, talk_id, Participant::new(format!("P{i}"), email))
                    .await
            })
        })
        .collect();

    let mut admitted = 0;
    for handle in contenders {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(DomainError::CapacityExceeded { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(store.len(Collection::Registrations), 1);
    assert_eq!(stored_count(&store, &talk).await, 1);
}

#[tokio::test]
async fn test_concurrent_cancels_keep_the_counter_exact() {
    let store = InMemoryDocumentStore::new();
    let mut config = Config::local();
    config.store.max_retries = 64;
    config.store.retry_initial_ms = 0;
    let services = services_with(&store, config);
    let talk = TalkBuilder::new("Emptying out").capacity(12).insert(&store).await;
    let talk_id = talk.id;

    let emails: Vec<String> = (0..12).map(|i| format!("p{i}@example.com")).collect();
    for email in &emails {
        services
            .ledger
            .register(&admin(), talk_id, Participant::new("P", email.as_str()))
            .await
            .unwrap();
    }
    assert_eq!(stored_count(&store, &talk).await, 12);

    // Every participant cancels twice at once.
    let cancellations: Vec<_> = emails
        .iter()
        .flat_map(|email| [email.clone(), email.clone()])
        .map(|email| {
            let ledger = services.ledger.clone();
            tokio::spawn(async move {
                let caller = participant(&email);
                let result = ledger.cancel(&caller, talk_id, &email).await;
                (email, result)
            })
        })
        .collect();

    let mut cancelled = std::collections::HashMap::<String, usize>::new();
    for handle in cancellations {
        match handle.await.unwrap() {
            (email, Ok(())) => *cancelled.entry(email).or_default() += 1,
            (_, Err(DomainError::RegistrationNotFound(_))) => {}
            (_, Err(other)) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(cancelled.len(), emails.len());
    assert!(cancelled.values().all(|&n| n == 1), "each email cancelled exactly once");
    assert_eq!(store.len(Collection::Registrations), 0);
    assert_eq!(stored_count(&store, &talk).await, 0);
}

#[tokio::test]
async fn test_interrupted_delete_leaves_consistent_talk_and_can_be_repeated() {
    let store = InMemoryDocumentStore::new();
    let mut config = Config::local();
    config.store.max_retries = 2;
    config.store.retry_initial_ms = 0;
    let services = services_with(&store, config);
    let talk = TalkBuilder::new("Interrupted").capacity(300).insert(&store).await;

    let total = CASCADE_BATCH * 2 + 30;
    for i in 0..total {
        services
            .ledger
            .register(&admin(), talk.id, Participant::new(format!("P{i}"), format!("p{i}@example.com")))
            .await
            .unwrap();
    }

    // First batch lands, every later commit fails until retries run out.
    store.fail_commits_after(1, 50);
    let err = services.catalog.delete_talk(&organizer(), talk.id).await.unwrap_err();
    assert!(matches!(err, DomainError::StoreUnavailable(_)));

    let remaining = store.len(Collection::Registrations);
    assert_eq!(remaining, total - CASCADE_BATCH);
    let stored = fetch_talk(&store, talk.id).await.unwrap().expect("talk survives");
    assert_eq!(usize::try_from(stored.value.registrant_count).unwrap(), remaining);

    store.fail_next_commits(0);
    services.catalog.delete_talk(&organizer(), talk.id).await.unwrap();

    assert!(fetch_talk(&store, talk.id).await.unwrap().is_none());
    assert_eq!(store.len(Collection::Registrations), 0);
}

#[tokio::test]
async fn test_delete_talk_cascades_past_one_batch() {
    let store = InMemoryDocumentStore::new();
    let services = services(&store);
    let talk = TalkBuilder::new("Crowded").capacity(300).insert(&store).await;
    let other = TalkBuilder::new("Neighbour").insert(&store).await;

    for i in 0..230 {
        services
            .ledger
            .register(&admin(), talk.id, Participant::new(format!("P{i}"), format!("p{i}@example.com")))
            .await
            .unwrap();
    }
    services
        .ledger
        .register(&admin(), other.id, Participant::new("Kept", "kept@example.com"))
        .await
        .unwrap();

    let err = services
        .catalog
        .delete_talk(&speaker("speaker@example.com"), talk.id)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::PermissionDenied { .. }), "speakers cannot delete");

    services.catalog.delete_talk(&organizer(), talk.id).await.unwrap();

    assert!(fetch_talk(&store, talk.id).await.unwrap().is_none());
    assert_eq!(store.len(Collection::Talks), 1);
    assert_eq!(store.len(Collection::Registrations), 1);

    let err = services.catalog.delete_talk(&admin(), talk.id).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound { kind: "Talk", .. }));
}

#[tokio::test]
async fn test_list_talks_repairs_drifted_counters() {
    let store = InMemoryDocumentStore::new();
    let services = services(&store);
    let talk = TalkBuilder::new("Drifted").registrant_count(7).insert(&store).await;
    services
        .ledger
        .register(&admin(), talk.id, Participant::new("Ana", "ana@example.com"))
        .await
        .unwrap();

    let talks = services.catalog.list_talks().await.unwrap();
    assert_eq!(talks.len(), 1);
    assert_eq!(talks[0].registrant_count, 1);
    assert_eq!(stored_count(&store, &talk).await, 1);
}

#[tokio::test]
async fn test_issued_certificate_stops_verifying_after_cancel() {
    let store = InMemoryDocumentStore::new();
    let services = services(&store);
    let talk = TalkBuilder::new("Signed").insert(&store).await;
    let ana = participant("ana@example.com");

    let id = services
        .ledger
        .register(&ana, talk.id, Participant::new("Ana", "ana@example.com"))
        .await
        .unwrap();
    services.attendance.set_attendance(&organizer(), id, true).await.unwrap();

    let issued = services.certificates.issue(&ana, talk.id, "ana@example.com").await.unwrap();
    assert!(services.certificates.verify(&issued.token).await.unwrap().valid);

    services.ledger.cancel(&ana, talk.id, "ana@example.com").await.unwrap();
    let check = services.certificates.verify(&issued.token).await.unwrap();
    assert!(!check.valid);
    assert_eq!(check.reason, Some(InvalidReason::NotRegistered));
}

#[tokio::test]
async fn test_talk_feed_follows_registrations() {
    let store = InMemoryDocumentStore::new();
    let services = services(&store);
    let talk = TalkBuilder::new("Live").insert(&store).await;

    let mut feed = services.ledger.subscribe_talk(&organizer(), talk.id).await.unwrap();
    let (first_sequence, registrations) = feed.next().await.unwrap().unwrap();
    assert!(registrations.is_empty());

    services
        .ledger
        .register(&admin(), talk.id, Participant::new("Ana", "ana@example.com"))
        .await
        .unwrap();

    let (sequence, registrations) = feed.next().await.unwrap().unwrap();
    assert!(sequence > first_sequence);
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].email, "ana@example.com");

    let err = services
        .ledger
        .subscribe_talk(&participant("ana@example.com"), talk.id)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, DomainError::PermissionDenied { .. }));
}

#[tokio::test]
async fn test_participant_sees_own_registrations_in_date_order() {
    let store = InMemoryDocumentStore::new();
    let services = services(&store);
    let mut later = TalkBuilder::new("Later").build();
    later.date = later.date.succ_opt().unwrap();
    store.commit(vec![later.create_op().unwrap()]).await.unwrap();
    let sooner = TalkBuilder::new("Sooner").insert(&store).await;
    let ana = participant("ana@example.com");

    for talk_id in [later.id, sooner.id] {
        services
            .ledger
            .register(&ana, talk_id, Participant::new("Ana", "ana@example.com"))
            .await
            .unwrap();
    }

    let mine = services.ledger.registrations_for(&ana, "ana@example.com").await.unwrap();
    let titles: Vec<_> = mine.iter().map(|r| r.talk.as_ref().unwrap().title.as_str()).collect();
    assert_eq!(titles, ["Sooner", "Later"]);

    let err = services
        .ledger
        .registrations_for(&ana, "bia@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::PermissionDenied { .. }));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Whatever sequence of registrations and cancellations runs, the stored
    /// counter equals the number of registration documents and never exceeds
    /// capacity.
    #[test]
    fn prop_counter_matches_registrations(
        capacity in 1_u32..6,
        steps in prop::collection::vec((properties::participant(), any::<bool>()), 1..20),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let store = InMemoryDocumentStore::new();
            let services = services(&store);
            let talk = TalkBuilder::new("Property").capacity(capacity).insert(&store).await;

            for (who, cancel) in steps {
                if cancel {
                    let _ = services.ledger.cancel(&admin(), talk.id, &who.email).await;
                } else {
                    let _ = services.ledger.register(&admin(), talk.id, who).await;
                }
                let count = stored_count(&store, &talk).await;
                let documents = u32::try_from(store.len(Collection::Registrations)).unwrap();
                prop_assert_eq!(count, documents);
                prop_assert!(count <= capacity);
            }
            Ok(())
        })?;
    }
}
