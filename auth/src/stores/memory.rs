//! In-memory session and CSRF-state stores.

use crate::error::{AuthError, Result};
use crate::providers::{Session, SessionStore, StateStore};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use talkboard_core::environment::Clock;
use talkboard_core::ids::UserId;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| AuthError::InternalError("Mutex lock failed".to_string()))
}

/// Session store backed by a `HashMap`.
///
/// Expiry is judged against the injected [`Clock`].
#[derive(Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    clock: Arc<dyn Clock>,
}

impl InMemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Number of stored sessions, expired ones included.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn session_count(&self) -> Result<usize> {
        Ok(lock(&self.sessions)?.len())
    }
}

impl SessionStore for InMemorySessionStore {
    fn create_session(
        &self,
        session: Session,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut sessions = lock(&self.sessions)?;
            if sessions.contains_key(&session.token) {
                return Err(AuthError::InternalError("Session token collision".to_string()));
            }
            sessions.insert(session.token.clone(), session);
            Ok(())
        })
    }

    fn get_session<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Session>> + Send + 'a>> {
        Box::pin(async move {
            let mut sessions = lock(&self.sessions)?;
            let session = sessions.get(token).cloned().ok_or(AuthError::SessionNotFound)?;

            if session.is_expired(self.clock.now()) {
                sessions.remove(token);
                return Err(AuthError::SessionExpired);
            }
            Ok(session)
        })
    }

    fn delete_session<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            lock(&self.sessions)?.remove(token);
            Ok(())
        })
    }

    fn delete_user_sessions<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + 'a>> {
        Box::pin(async move {
            let mut sessions = lock(&self.sessions)?;
            let before = sessions.len();
            sessions.retain(|_, s| &s.user_id != user_id);
            Ok(before - sessions.len())
        })
    }
}

/// Single-use OAuth state values with expiry.
#[derive(Clone)]
pub struct InMemoryStateStore {
    states: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }
}

impl StateStore for InMemoryStateStore {
    fn issue(
        &self,
        state: String,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let now = self.clock.now();
            let mut states = lock(&self.states)?;
            // Abandoned sign-ins would otherwise accumulate forever.
            states.retain(|_, expires_at| *expires_at > now);
            states.insert(state, now + ttl);
            Ok(())
        })
    }

    fn consume<'a>(
        &'a self,
        state: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let expires_at = lock(&self.states)?
                .remove(state)
                .ok_or(AuthError::OAuthStateInvalid)?;
            if expires_at <= self.clock.now() {
                return Err(AuthError::OAuthStateInvalid);
            }
            Ok(())
        })
    }
}
