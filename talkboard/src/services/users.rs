//! User administration. Every operation requires `canManageUsers`.
//!
//! Role changes and deletions revoke the user's open sessions, so the new
//! role applies from the next request instead of the next login.

use super::TxError;
use serde::Deserialize;
use std::sync::Arc;
use talkboard_auth::LoginFlow;
use talkboard_core::document_store::{Collection, DocumentStore, Query};
use talkboard_core::environment::Clock;
use talkboard_core::error::DomainError;
use talkboard_core::ids::UserId;
use talkboard_core::model::{User, is_valid_email, normalize_email};
use talkboard_core::records::{Record, Versioned, fetch_user, find};
use talkboard_core::role::{Permission, Role};
use talkboard_core::session::SessionContext;
use talkboard_runtime::retry::{RetryPolicy, retry_store};
use tracing::{info, warn};

/// Profile fields an administrator may write.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UserProfile {
    /// User id (provider subject).
    pub id: UserId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Email.
    pub email: String,
    /// Role. Unset keeps the stored role, or `participant` for a new user.
    #[serde(default)]
    pub role: Option<String>,
    /// Avatar URL.
    #[serde(default)]
    pub image: Option<String>,
}

/// Administrator operations on `users`.
#[derive(Clone)]
pub struct UserAdmin {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    login: LoginFlow,
}

impl UserAdmin {
    /// Create the service. `login` is used to revoke sessions.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, retry: RetryPolicy, login: LoginFlow) -> Self {
        Self {
            store,
            clock,
            retry,
            login,
        }
    }

    /// Every user, by name.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied`: caller is not an administrator
    /// - `StoreUnavailable`: the store kept failing
    pub async fn list(&self, caller: &SessionContext) -> Result<Vec<User>, DomainError> {
        caller.permissions().require(Permission::ManageUsers)?;
        let mut users: Vec<User> = retry_store(&self.retry, "list_users", || {
            find::<User>(self.store.as_ref(), Query::new(Collection::Users))
        })
        .await?
        .into_iter()
        .map(|u| u.value)
        .collect();
        users.sort_by(|a, b| (&a.name, &a.email).cmp(&(&b.name, &b.email)));
        Ok(users)
    }

    /// Create a user or overwrite its profile fields.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied`: caller is not an administrator
    /// - `Validation`: empty id, malformed email or unknown role
    /// - `StoreUnavailable`: the store kept failing
    #[tracing::instrument(skip(self, caller, profile), fields(user_id = %profile.id))]
    pub async fn upsert(&self, caller: &SessionContext, profile: UserProfile) -> Result<User, DomainError> {
        caller.permissions().require(Permission::ManageUsers)?;

        if profile.id.as_str().trim().is_empty() {
            return Err(DomainError::validation("user id is required"));
        }
        let email = normalize_email(&profile.email);
        if !is_valid_email(&email) {
            return Err(DomainError::validation(format!("{email:?} is not a valid email")));
        }
        let role = profile.role.as_deref().map(parse_role).transpose()?;
        if profile.id == caller.user_id && role.is_some_and(|r| r != Role::Administrator) {
            return Err(DomainError::validation("administrators cannot demote themselves"));
        }

        let profile = &profile;
        let email = email.as_str();
        let (user, role_changed) = retry_store(&self.retry, "upsert_user", move || {
            self.try_upsert(profile, email, role)
        })
        .await?;

        if role_changed {
            self.revoke(&user.id).await;
        }
        info!(role = %user.role, "User saved");
        Ok(user)
    }

    async fn try_upsert(
        &self,
        profile: &UserProfile,
        email: &str,
        role: Option<Role>,
    ) -> Result<(User, bool), TxError> {
        let now = self.clock.now();
        let name = match profile.name.trim() {
            "" => email.to_string(),
            name => name.to_string(),
        };

        if let Some(Versioned {
            value: mut user,
            revision,
        }) = fetch_user(self.store.as_ref(), &profile.id).await?
        {
            let previous = user.role.clone();
            user.name = name;
            user.email = email.to_string();
            user.image = profile.image.clone();
            if let Some(role) = role {
                user.role = role.as_str().to_string();
            }
            user.updated_at = now;
            self.store.commit(vec![user.update_op(revision)?]).await?;
            let changed = user.role != previous;
            return Ok((user, changed));
        }

        let user = User {
            id: profile.id.clone(),
            name,
            email: email.to_string(),
            role: role.unwrap_or(Role::Participant).as_str().to_string(),
            image: profile.image.clone(),
            created_at: now,
            updated_at: now,
        };
        self.store.commit(vec![user.create_op()?]).await?;
        Ok((user, false))
    }

    /// Change a user's role.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied`: caller is not an administrator
    /// - `Validation`: unknown role, or an administrator demoting themselves
    /// - `NotFound`: no such user
    /// - `StoreUnavailable`: the store kept failing
    #[tracing::instrument(skip(self, caller), fields(user_id = %user_id, role = %role))]
    pub async fn set_role(&self, caller: &SessionContext, user_id: &UserId, role: &str) -> Result<User, DomainError> {
        caller.permissions().require(Permission::ManageUsers)?;
        let role = parse_role(role)?;
        if *user_id == caller.user_id && role != Role::Administrator {
            return Err(DomainError::validation("administrators cannot demote themselves"));
        }

        let user = retry_store(&self.retry, "set_role", || self.try_set_role(user_id, role)).await?;
        self.revoke(user_id).await;
        info!("Role changed");
        Ok(user)
    }

    async fn try_set_role(&self, user_id: &UserId, role: Role) -> Result<User, TxError> {
        let Versioned {
            value: mut user,
            revision,
        } = fetch_user(self.store.as_ref(), user_id)
            .await?
            .ok_or_else(|| user_not_found(user_id))?;

        user.role = role.as_str().to_string();
        user.updated_at = self.clock.now();
        self.store.commit(vec![user.update_op(revision)?]).await?;
        Ok(user)
    }

    /// Delete a user. Their registrations and talks are left in place.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied`: caller is not an administrator
    /// - `Validation`: an administrator deleting themselves
    /// - `NotFound`: no such user
    /// - `StoreUnavailable`: the store kept failing
    #[tracing::instrument(skip(self, caller), fields(user_id = %user_id))]
    pub async fn delete_user(&self, caller: &SessionContext, user_id: &UserId) -> Result<(), DomainError> {
        caller.permissions().require(Permission::ManageUsers)?;
        if *user_id == caller.user_id {
            return Err(DomainError::validation("administrators cannot delete themselves"));
        }

        retry_store(&self.retry, "delete_user", || async move {
            let user = fetch_user(self.store.as_ref(), user_id)
                .await?
                .ok_or_else(|| user_not_found(user_id))?;
            self.store
                .commit(vec![user.value.delete_op(user.revision)])
                .await?;
            Ok::<_, TxError>(())
        })
        .await?;

        self.revoke(user_id).await;
        info!("User deleted");
        Ok(())
    }

    async fn revoke(&self, user_id: &UserId) {
        if let Err(e) = self.login.revoke_user(user_id).await {
            warn!(user_id = %user_id, error = %e, "Failed to revoke sessions");
        }
    }
}

fn parse_role(raw: &str) -> Result<Role, DomainError> {
    Role::parse(raw).map_err(|e| DomainError::validation(e.to_string()))
}

fn user_not_found(user_id: &UserId) -> DomainError {
    DomainError::NotFound {
        kind: "User",
        id: user_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use talkboard_auth::OAuthConfig;
    use talkboard_auth::UserDirectory;
    use talkboard_auth::stores::{InMemorySessionStore, InMemoryStateStore};
    use talkboard_testing::fixtures::{admin, organizer};
    use talkboard_testing::{InMemoryDocumentStore, test_clock};

    fn admin_service(store: &InMemoryDocumentStore) -> UserAdmin {
        let store: Arc<dyn DocumentStore> = Arc::new(store.clone());
        let clock: Arc<dyn Clock> = Arc::new(test_clock());
        let retry = RetryPolicy::immediate(3);
        let login = LoginFlow::new(
            None,
            Arc::new(InMemoryStateStore::new(clock.clone())),
            Arc::new(InMemorySessionStore::new(clock.clone())),
            UserDirectory::new(store.clone(), clock.clone(), retry.clone()),
            clock.clone(),
            OAuthConfig::default(),
        );
        UserAdmin::new(store, clock, retry, login)
    }

    fn profile(id: &str, email: &str) -> UserProfile {
        UserProfile {
            id: UserId::new(id),
            name: String::new(),
            email: email.to_string(),
            role: None,
            image: None,
        }
    }

    #[tokio::test]
    async fn test_only_administrators() {
        let store = InMemoryDocumentStore::new();
        let users = admin_service(&store);
        let err = users.list(&organizer()).await.unwrap_err();
        assert_eq!(err, DomainError::PermissionDenied { permission: Permission::ManageUsers });
        let err = users.upsert(&organizer(), profile("u1", "a@x.com")).await.unwrap_err();
        assert!(matches!(err, DomainError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn test_upsert_and_set_role() {
        let store = InMemoryDocumentStore::new();
        let users = admin_service(&store);

        let created = users.upsert(&admin(), profile("u1", " Ana@X.com ")).await.unwrap();
        assert_eq!(created.email, "ana@x.com");
        assert_eq!(created.name, "ana@x.com");
        assert_eq!(created.role, "participant");

        let updated = users.set_role(&admin(), &UserId::new("u1"), " Palestrante ").await.unwrap();
        assert_eq!(updated.role, "speaker");

        let err = users.set_role(&admin(), &UserId::new("u1"), "superuser").await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = users.set_role(&admin(), &UserId::new("ghost"), "speaker").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { kind: "User", .. }));

        // Profile refresh keeps the role.
        let refreshed = users.upsert(&admin(), profile("u1", "ana@x.com")).await.unwrap();
        assert_eq!(refreshed.role, "speaker");
        assert_eq!(users.list(&admin()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_admin_cannot_demote_or_delete_self() {
        let store = InMemoryDocumentStore::new();
        let users = admin_service(&store);
        let me = admin();

        let err = users.set_role(&me, &me.user_id, "organizer").await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        let err = users.delete_user(&me, &me.user_id).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_user() {
        let store = InMemoryDocumentStore::new();
        let users = admin_service(&store);
        users.upsert(&admin(), profile("u1", "a@x.com")).await.unwrap();

        users.delete_user(&admin(), &UserId::new("u1")).await.unwrap();
        assert!(store.is_empty(Collection::Users));
        let err = users.delete_user(&admin(), &UserId::new("u1")).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }
}
