//! Google sign-in endpoints.
//!
//! - GET  /auth/google/login     - Redirect to Google's consent page
//! - GET  /auth/google/callback  - Finish sign-in, returns a session token
//! - POST /auth/logout           - End the current session
//! - GET  /auth/me               - Caller identity and effective permissions

use crate::server::{AppState, CurrentUser};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::Redirect,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use talkboard_core::role::Permissions;
use talkboard_core::session::SessionContext;
use talkboard_web::{AppError, BearerToken, ClientIp, CorrelationId, UserAgent};
use tracing::{info, warn};

/// Query string Google sends back to the callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code
    pub code: String,
    /// CSRF state issued by the login redirect
    pub state: String,
}

/// A freshly opened session.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    /// Bearer token for later requests
    pub token: String,
    /// Session expiry
    pub expires_at: DateTime<Utc>,
    /// Who signed in
    pub user: SessionContext,
    /// Avatar URL
    pub image: Option<String>,
}

/// The caller and what they may do.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    /// Caller identity
    pub user: SessionContext,
    /// Effective permissions for the caller's role
    pub permissions: Permissions,
}

/// Redirect the browser to Google.
///
/// # Errors
///
/// 503 if Google sign-in is not configured.
pub async fn login(State(state): State<AppState>) -> Result<Redirect, AppError> {
    let url = state.login.begin().await?;
    Ok(Redirect::to(&url))
}

/// Exchange the authorization code and open a session.
///
/// First sign-in provisions the user as a participant, except on an empty
/// directory where the first account becomes the administrator.
///
/// # Errors
///
/// 400 for an unknown or replayed state, 403 for an unverified email,
/// 502 if Google cannot be reached.
pub async fn callback(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    client_ip: ClientIp,
    user_agent: UserAgent,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state.login.complete(&query.code, &query.state).await.inspect_err(|e| {
        warn!(
            correlation_id = %correlation_id.0,
            ip = %client_ip.0,
            user_agent = %user_agent.0,
            error = %e,
            "Sign-in failed"
        );
    })?;
    info!(
        correlation_id = %correlation_id.0,
        user_id = %session.user_id,
        ip = %client_ip.0,
        user_agent = %user_agent.0,
        "Signed in"
    );
    Ok(Json(SessionResponse {
        user: session.context(),
        token: session.token,
        expires_at: session.expires_at,
        image: session.image,
    }))
}

/// End the session the bearer token names.
///
/// # Errors
///
/// 401 without a token, 503 if the session store fails.
pub async fn logout(State(state): State<AppState>, BearerToken(token): BearerToken) -> Result<StatusCode, AppError> {
    state.login.logout(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The signed-in caller. Answers 401 without a valid session.
pub async fn me(CurrentUser(user): CurrentUser) -> Json<MeResponse> {
    Json(MeResponse {
        permissions: user.permissions(),
        user,
    })
}
