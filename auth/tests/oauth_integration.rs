//! Integration tests for the sign-in flow.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Arc;
use talkboard_auth::mocks::MockOAuth2Provider;
use talkboard_auth::stores::{InMemorySessionStore, InMemoryStateStore};
use talkboard_auth::{AuthError, LoginFlow, OAuthConfig, UserDirectory};
use talkboard_core::role::Role;
use talkboard_runtime::retry::RetryPolicy;
use talkboard_testing::mocks::test_instant;
use talkboard_testing::{InMemoryDocumentStore, ManualClock};

struct Harness {
    flow: LoginFlow,
    clock: Arc<ManualClock>,
}

fn harness(provider: MockOAuth2Provider) -> Harness {
    let store = Arc::new(InMemoryDocumentStore::new());
    let clock = Arc::new(ManualClock::new(test_instant()));
    let directory = UserDirectory::new(store, clock.clone(), RetryPolicy::immediate(3));

    let flow = LoginFlow::new(
        Some(Arc::new(provider)),
        Arc::new(InMemoryStateStore::new(clock.clone())),
        Arc::new(InMemorySessionStore::new(clock.clone())),
        directory,
        clock.clone(),
        OAuthConfig::new("https://talks.example.com".to_string()),
    );
    Harness { flow, clock }
}

/// Pull the `state` parameter back out of the authorization URL.
fn state_of(url: &str) -> String {
    let query = url.split_once('?').expect("query string").1;
    let params: Vec<(String, String)> = serde_urlencoded::from_str(query).expect("decodes");
    params
        .into_iter()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v)
        .expect("state param")
}

#[tokio::test]
async fn test_oauth_flow_complete_happy_path() {
    let provider = MockOAuth2Provider::new()
        .with_profile("code-ana", MockOAuth2Provider::profile("sub-ana", "Ana@Example.com"));
    let h = harness(provider);

    let url = h.flow.begin().await.unwrap();
    assert!(url.contains("redirect_uri=https%3A%2F%2Ftalks.example.com%2Fauth%2Fgoogle%2Fcallback"));

    let session = h.flow.complete("code-ana", &state_of(&url)).await.unwrap();
    assert_eq!(session.email, "ana@example.com");
    assert_eq!(session.role, Role::Administrator);

    let caller = h.flow.authenticate(&session.token).await.unwrap();
    assert_eq!(caller.user_id.as_str(), "sub-ana");
    assert!(caller.permissions().can_manage_users);
}

#[tokio::test]
async fn test_state_cannot_be_replayed() {
    let provider = MockOAuth2Provider::new()
        .with_profile("code-ana", MockOAuth2Provider::profile("sub-ana", "ana@example.com"));
    let h = harness(provider);

    let state = state_of(&h.flow.begin().await.unwrap());
    h.flow.complete("code-ana", &state).await.unwrap();

    let replay = h.flow.complete("code-ana", &state).await;
    assert_eq!(replay.unwrap_err(), AuthError::OAuthStateInvalid);
}

#[tokio::test]
async fn test_forged_state_is_rejected_before_code_exchange() {
    let h = harness(MockOAuth2Provider::new());
    let err = h.flow.complete("whatever", "forged").await.unwrap_err();
    assert_eq!(err, AuthError::OAuthStateInvalid);
}

#[tokio::test]
async fn test_unknown_code_fails() {
    let h = harness(MockOAuth2Provider::new());
    let state = state_of(&h.flow.begin().await.unwrap());
    let err = h.flow.complete("bad-code", &state).await.unwrap_err();
    assert_eq!(err, AuthError::OAuthCodeInvalid);
}

#[tokio::test]
async fn test_unverified_email_cannot_sign_in() {
    let mut profile = MockOAuth2Provider::profile("sub-x", "x@example.com");
    profile.email_verified = false;
    let h = harness(MockOAuth2Provider::new().with_profile("code-x", profile));

    let state = state_of(&h.flow.begin().await.unwrap());
    let err = h.flow.complete("code-x", &state).await.unwrap_err();
    assert_eq!(err, AuthError::EmailNotVerified);
}

#[tokio::test]
async fn test_second_user_is_participant() {
    let provider = MockOAuth2Provider::new()
        .with_profile("code-ana", MockOAuth2Provider::profile("sub-ana", "ana@example.com"))
        .with_profile("code-bia", MockOAuth2Provider::profile("sub-bia", "bia@example.com"));
    let h = harness(provider);

    let state = state_of(&h.flow.begin().await.unwrap());
    h.flow.complete("code-ana", &state).await.unwrap();
    let state = state_of(&h.flow.begin().await.unwrap());
    let bia = h.flow.complete("code-bia", &state).await.unwrap();

    assert_eq!(bia.role, Role::Participant);
    assert!(!bia.context().permissions().can_create_talk);
}

#[tokio::test]
async fn test_session_expires_and_logout_revokes() {
    let provider = MockOAuth2Provider::new()
        .with_profile("code-ana", MockOAuth2Provider::profile("sub-ana", "ana@example.com"));
    let h = harness(provider);

    let state = state_of(&h.flow.begin().await.unwrap());
    let first = h.flow.complete("code-ana", &state).await.unwrap();
    h.flow.logout(&first.token).await.unwrap();
    assert_eq!(
        h.flow.authenticate(&first.token).await.unwrap_err(),
        AuthError::SessionNotFound
    );

    let state = state_of(&h.flow.begin().await.unwrap());
    let second = h.flow.complete("code-ana", &state).await.unwrap();
    h.clock.advance(chrono::Duration::hours(25));
    assert_eq!(
        h.flow.authenticate(&second.token).await.unwrap_err(),
        AuthError::SessionExpired
    );
}

#[tokio::test]
async fn test_unconfigured_provider() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let clock = Arc::new(ManualClock::new(test_instant()));
    let flow = LoginFlow::new(
        None,
        Arc::new(InMemoryStateStore::new(clock.clone())),
        Arc::new(InMemorySessionStore::new(clock.clone())),
        UserDirectory::new(store, clock.clone(), RetryPolicy::immediate(0)),
        clock,
        OAuthConfig::default(),
    );

    assert_eq!(flow.begin().await.unwrap_err(), AuthError::ProviderNotConfigured);
}
