//! OAuth2 identity provider trait.

use crate::error::Result;
use crate::providers::IdentityProfile;
use std::future::Future;
use std::pin::Pin;

/// An OAuth2/OIDC provider driving the authorization code flow.
///
/// Boxed futures keep the trait dyn-compatible so the server can hold an
/// `Arc<dyn OAuth2Provider>`.
pub trait OAuth2Provider: Send + Sync {
    /// URL to send the browser to.
    ///
    /// # Errors
    ///
    /// Returns error if the URL cannot be built.
    fn authorization_url(&self, state: &str, redirect_uri: &str) -> Result<String>;

    /// Exchange an authorization code for an access token.
    ///
    /// # Errors
    ///
    /// `OAuthCodeInvalid` or `OAuthTokenExchangeFailed`.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        redirect_uri: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

    /// Fetch the profile behind an access token.
    ///
    /// # Errors
    ///
    /// `OAuthUserInfoFailed`, or `EmailNotVerified` when the provider has not
    /// verified the email.
    fn fetch_profile<'a>(
        &'a self,
        access_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<IdentityProfile>> + Send + 'a>>;
}
