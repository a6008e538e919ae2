//! Mock OAuth2 provider for testing.

use crate::error::{AuthError, Result};
use crate::providers::{IdentityProfile, OAuth2Provider};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Mock `OAuth2` provider.
///
/// Each authorization code maps to a profile registered with
/// [`MockOAuth2Provider::with_profile`]; the access token is the code itself.
#[derive(Debug, Clone, Default)]
pub struct MockOAuth2Provider {
    profiles: Arc<Mutex<HashMap<String, IdentityProfile>>>,
}

impl MockOAuth2Provider {
    /// Create a provider that knows no codes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `profile` under authorization `code`.
    #[must_use]
    pub fn with_profile(self, code: &str, profile: IdentityProfile) -> Self {
        if let Ok(mut profiles) = self.profiles.lock() {
            profiles.insert(code.to_string(), profile);
        }
        self
    }

    /// A verified profile for `subject` / `email`.
    #[must_use]
    pub fn profile(subject: &str, email: &str) -> IdentityProfile {
        IdentityProfile {
            subject: subject.to_string(),
            email: email.to_string(),
            email_verified: true,
            name: Some(format!("User {subject}")),
            picture: None,
        }
    }
}

impl OAuth2Provider for MockOAuth2Provider {
    fn authorization_url(&self, state: &str, redirect_uri: &str) -> Result<String> {
        let query = serde_urlencoded::to_string([("state", state), ("redirect_uri", redirect_uri)])
            .map_err(|e| AuthError::InternalError(e.to_string()))?;
        Ok(format!("https://identity.test/authorize?{query}"))
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        _redirect_uri: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let known = self
                .profiles
                .lock()
                .map_err(|_| AuthError::InternalError("Mutex lock failed".to_string()))?
                .contains_key(code);
            if known {
                Ok(code.to_string())
            } else {
                Err(AuthError::OAuthCodeInvalid)
            }
        })
    }

    fn fetch_profile<'a>(
        &'a self,
        access_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<IdentityProfile>> + Send + 'a>> {
        Box::pin(async move {
            let profile = self
                .profiles
                .lock()
                .map_err(|_| AuthError::InternalError("Mutex lock failed".to_string()))?
                .get(access_token)
                .cloned()
                .ok_or_else(|| AuthError::OAuthUserInfoFailed("unknown token".to_string()))?;

            if !profile.email_verified {
                return Err(AuthError::EmailNotVerified);
            }
            Ok(profile)
        })
    }
}
