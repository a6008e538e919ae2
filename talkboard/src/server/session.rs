//! Session extractor.
//!
//! ```rust,ignore
//! async fn my_registrations(
//!     CurrentUser(caller): CurrentUser,
//!     State(state): State<AppState>,
//! ) -> Result<Json<Vec<ParticipantRegistration>>, AppError> {
//!     // caller carries the role read at sign-in
//! }
//! ```

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use talkboard_auth::LoginFlow;
use talkboard_core::session::SessionContext;
use talkboard_web::{AppError, BearerToken};

/// The authenticated caller, resolved from the bearer token.
///
/// Rejects with 401 when the token is missing, unknown or expired.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub SessionContext);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    LoginFlow: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let login = LoginFlow::from_ref(state);
        let caller = login.authenticate(&token).await?;

        tracing::debug!(user_id = %caller.user_id, role = %caller.role, "Request authenticated");
        Ok(Self(caller))
    }
}
