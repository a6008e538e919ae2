//! First-login user provisioning.
//!
//! The very first account becomes an administrator. Two people signing in
//! for the first time at the same moment race to create the
//! `system/bootstrap-admin` document in the same commit as their user
//! document; the store lets exactly one of those creates through and the
//! loser is provisioned as a participant.

use crate::error::{AuthError, Result};
use crate::providers::IdentityProfile;
use serde_json::json;
use std::sync::Arc;
use talkboard_core::document_store::{
    Collection, DocumentStore, Query, Revision, StoreError, WriteOp,
};
use talkboard_core::environment::Clock;
use talkboard_core::ids::UserId;
use talkboard_core::model::{User, is_valid_email, normalize_email};
use talkboard_core::records::{Record, fetch_user};
use talkboard_core::role::Role;
use talkboard_runtime::retry::{RetryPolicy, retry_store};

/// Id of the document claimed by the first administrator.
pub const BOOTSTRAP_ADMIN_ID: &str = "bootstrap-admin";

/// Creates and refreshes user documents from identity profiles.
#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl UserDirectory {
    /// Create a directory over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self { store, clock, retry }
    }

    /// Create the user on first login, or refresh name, email and avatar on
    /// later logins. The stored role is never changed here.
    ///
    /// # Errors
    ///
    /// `OAuthUserInfoFailed` for a malformed email, `Store` once retries are
    /// exhausted.
    #[tracing::instrument(skip(self, profile), fields(subject = %profile.subject))]
    pub async fn provision(&self, profile: &IdentityProfile) -> Result<User> {
        let email = normalize_email(&profile.email);
        if !is_valid_email(&email) {
            return Err(AuthError::OAuthUserInfoFailed(format!(
                "provider returned malformed email {email:?}"
            )));
        }

        retry_store(&self.retry, "provision_user", || self.try_provision(profile, &email)).await
    }

    async fn try_provision(&self, profile: &IdentityProfile, email: &str) -> Result<User> {
        let now = self.clock.now();
        let user_id = UserId::new(profile.subject.clone());
        let name = profile
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string());

        if let Some(existing) = fetch_user(self.store.as_ref(), &user_id).await? {
            let mut user = existing.value;
            if user.name == name && user.email == email && user.image == profile.picture {
                return Ok(user);
            }
            user.name = name;
            user.email = email.to_string();
            user.image.clone_from(&profile.picture);
            user.updated_at = now;
            self.store.commit(vec![user.update_op(existing.revision)?]).await?;
            tracing::debug!("Refreshed user profile");
            return Ok(user);
        }

        let mut user = User {
            id: user_id,
            name,
            email: email.to_string(),
            role: Role::Participant.as_str().to_string(),
            image: profile.picture.clone(),
            created_at: now,
            updated_at: now,
        };

        if self.is_first_user().await? {
            user.role = Role::Administrator.as_str().to_string();
            let claim = WriteOp::create(
                Collection::System,
                BOOTSTRAP_ADMIN_ID,
                json!({ "user_id": user.id, "claimed_at": now }),
            );
            match self.store.commit(vec![claim, user.create_op()?]).await {
                Ok(_) => {
                    tracing::info!(email = %user.email, "First user provisioned as administrator");
                    return Ok(user);
                }
                Err(StoreError::AlreadyExists {
                    collection: Collection::System,
                    ..
                }) => {
                    tracing::info!("Administrator already claimed by a concurrent sign-in");
                    user.role = Role::Participant.as_str().to_string();
                }
                Err(e) => return Err(Self::create_error(e, &user.id)),
            }
        }

        match self.store.commit(vec![user.create_op()?]).await {
            Ok(_) => {
                tracing::info!(email = %user.email, "User provisioned");
                Ok(user)
            }
            Err(e) => Err(Self::create_error(e, &user.id)),
        }
    }

    async fn is_first_user(&self) -> Result<bool> {
        if self
            .store
            .get(Collection::System, BOOTSTRAP_ADMIN_ID)
            .await?
            .is_some()
        {
            return Ok(false);
        }
        Ok(self.store.query(Query::new(Collection::Users)).await?.is_empty())
    }

    /// A concurrent sign-in of the same person created the user first; hand
    /// back a conflict so the retry loop takes the refresh path.
    fn create_error(error: StoreError, user_id: &UserId) -> AuthError {
        if let StoreError::AlreadyExists {
            collection: Collection::Users,
            ..
        } = error
        {
            tracing::debug!(user_id = %user_id, "User created concurrently");
            return AuthError::Store(StoreError::ConcurrencyConflict {
                collection: Collection::Users,
                id: user_id.to_string(),
                expected: Revision::INITIAL,
                actual: None,
            });
        }
        AuthError::Store(error)
    }
}
