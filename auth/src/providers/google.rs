//! Google OAuth 2.0 provider implementation.

use crate::error::{AuthError, Result};
use crate::providers::{IdentityProfile, OAuth2Provider};
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Google OAuth 2.0 provider.
///
/// # Configuration
///
/// 1. Create OAuth 2.0 credentials in Google Cloud Console
/// 2. Register `{AUTH_BASE_URL}/auth/google/callback` as a redirect URI
/// 3. Set `GOOGLE_CLIENT_ID` and `GOOGLE_CLIENT_SECRET`
///
/// # Example
///
/// ```no_run
/// use talkboard_auth::providers::GoogleOAuthProvider;
///
/// let google = GoogleOAuthProvider::new(
///     "your-client-id".to_string(),
///     "your-client-secret".to_string(),
/// );
/// ```
#[derive(Clone, Debug)]
pub struct GoogleOAuthProvider {
    /// OAuth 2.0 client ID from Google Cloud Console.
    client_id: String,

    /// OAuth 2.0 client secret (keep confidential).
    client_secret: String,

    /// HTTP client for making requests.
    http_client: Client,

    /// Scopes to request (default: "openid email profile").
    scopes: Vec<String>,

    /// Force the account chooser on every sign-in.
    ///
    /// Default: true
    select_account: bool,
}

impl GoogleOAuthProvider {
    /// Create a new Google OAuth provider.
    #[must_use]
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
            http_client: Client::new(),
            scopes: vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ],
            select_account: true,
        }
    }

    /// Set custom scopes.
    ///
    /// Default scopes are: `openid email profile`
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Show the account chooser on every sign-in.
    #[must_use]
    pub const fn with_select_account(mut self, select: bool) -> Self {
        self.select_account = select;
        self
    }

    async fn request_token(&self, code: &str, redirect_uri: &str) -> Result<String> {
        let params = [
            ("code", code),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http_client
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::OAuthTokenExchangeFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::BAD_REQUEST {
            tracing::warn!("Google rejected authorization code");
            return Err(AuthError::OAuthCodeInvalid);
        }
        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!(body = %error_body, "Google token exchange failed");
            return Err(AuthError::OAuthTokenExchangeFailed(
                "Token exchange failed".to_string(),
            ));
        }

        let token: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::OAuthTokenExchangeFailed(e.to_string()))?;
        Ok(token.access_token)
    }

    async fn request_profile(&self, access_token: &str) -> Result<IdentityProfile> {
        let response = self
            .http_client
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::OAuthUserInfoFailed(e.to_string()))?;

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!(body = %error_body, "Google UserInfo request failed");
            return Err(AuthError::OAuthUserInfoFailed(
                "UserInfo fetch failed".to_string(),
            ));
        }

        let google_user: GoogleUserInfo = response
            .json()
            .await
            .map_err(|e| AuthError::OAuthUserInfoFailed(e.to_string()))?;

        if !google_user.email_verified {
            tracing::warn!(email = %google_user.email, "Google user email not verified");
            return Err(AuthError::EmailNotVerified);
        }

        Ok(IdentityProfile {
            subject: google_user.sub,
            email: google_user.email,
            email_verified: google_user.email_verified,
            name: google_user.name,
            picture: google_user.picture,
        })
    }
}

impl OAuth2Provider for GoogleOAuthProvider {
    fn authorization_url(&self, state: &str, redirect_uri: &str) -> Result<String> {
        let scope = self.scopes.join(" ");
        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", state),
        ];

        if self.select_account {
            params.push(("prompt", "select_account"));
        }

        let query = serde_urlencoded::to_string(&params)
            .map_err(|e| AuthError::InternalError(format!("Failed to build URL: {e}")))?;

        Ok(format!("{AUTHORIZE_URL}?{query}"))
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        redirect_uri: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.request_token(code, redirect_uri))
    }

    fn fetch_profile<'a>(
        &'a self,
        access_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<IdentityProfile>> + Send + 'a>> {
        Box::pin(self.request_profile(access_token))
    }
}

/// Google's token endpoint response format.
#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    /// Access token for API requests.
    access_token: String,
}

/// Google's UserInfo endpoint response format.
#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    /// Google user ID (stable, unique identifier).
    sub: String,

    /// Full name.
    name: Option<String>,

    /// Profile picture URL.
    picture: Option<String>,

    /// Email address.
    email: String,

    /// Whether email is verified by Google.
    #[serde(default)]
    email_verified: bool,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn google() -> GoogleOAuthProvider {
        GoogleOAuthProvider::new("test_client_id".to_string(), "test_secret".to_string())
    }

    #[test]
    fn test_google_provider_creation() {
        let google = google();
        assert_eq!(google.scopes, vec!["openid", "email", "profile"]);
        assert!(google.select_account);
    }

    #[test]
    fn test_authorization_url() {
        let url = google()
            .authorization_url("test_state_123", "http://localhost:8080/auth/google/callback")
            .unwrap();

        assert!(url.starts_with(AUTHORIZE_URL));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fauth%2Fgoogle%2Fcallback"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=openid+email+profile"));
        assert!(url.contains("state=test_state_123"));
        assert!(url.contains("prompt=select_account"));
    }

    #[test]
    fn test_authorization_url_without_account_chooser() {
        let url = google()
            .with_select_account(false)
            .with_scopes(vec!["openid".to_string(), "email".to_string()])
            .authorization_url("s", "http://localhost/cb")
            .unwrap();

        assert!(!url.contains("prompt="));
        assert!(url.contains("scope=openid+email"));
    }

    #[test]
    fn test_userinfo_without_verification_flag_is_unverified() {
        let info: GoogleUserInfo =
            serde_json::from_str(r#"{"sub":"1","email":"a@x.com"}"#).unwrap();
        assert!(!info.email_verified);
    }
}
