//! Registration and attendance endpoints.
//!
//! - POST   /api/talks/:id/registrations               - Register (self by default)
//! - DELETE /api/talks/:id/registrations?email=...      - Cancel
//! - PUT    /api/registrations/:id/attendance          - Mark presence
//! - GET    /api/me/registrations?email=...             - A participant's registrations

use crate::server::{AppState, CurrentUser};
use crate::services::ledger::ParticipantRegistration;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use talkboard_core::ids::{RegistrationId, TalkId};
use talkboard_core::model::{Participant, Registration};
use talkboard_web::AppError;

/// Request to register for a talk. Both fields default to the caller.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    /// Participant name
    #[serde(default)]
    pub name: Option<String>,
    /// Participant email
    #[serde(default)]
    pub email: Option<String>,
}

/// A created registration.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    /// Deterministic id derived from talk and email
    pub registration_id: RegistrationId,
    /// Talk registered for
    pub talk_id: TalkId,
}

/// Whose registration is addressed; the caller when omitted.
#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    /// Participant email
    pub email: Option<String>,
}

/// Request to set attendance.
#[derive(Debug, Deserialize)]
pub struct AttendanceRequest {
    /// Whether the participant was there
    pub present: bool,
}

/// Register for a talk.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/talks/<talk_id>/registrations \
///   -H "Authorization: Bearer <session_token>" \
///   -H "Content-Type: application/json" -d '{}'
/// ```
///
/// # Errors
///
/// - 400: invalid name or email
/// - 403: registering someone else without `canEditAnyTalk`
/// - 404: no such talk
/// - 409: already registered, no seats left, or registering for one's own talk
pub async fn register(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(talk_id): Path<TalkId>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let participant = Participant::new(
        request.name.unwrap_or_else(|| caller.name.clone()),
        request.email.unwrap_or_else(|| caller.email.clone()),
    );
    let registration_id = state.services.ledger.register(&caller, talk_id, participant).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            registration_id,
            talk_id,
        }),
    ))
}

/// Cancel a registration.
///
/// # Errors
///
/// 403 when cancelling someone else without `canEditAnyTalk`, 404 if there
/// is nothing to cancel.
pub async fn cancel(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(talk_id): Path<TalkId>,
    Query(query): Query<EmailQuery>,
) -> Result<StatusCode, AppError> {
    let email = query.email.unwrap_or_else(|| caller.email.clone());
    state.services.ledger.cancel(&caller, talk_id, &email).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Mark or unmark a participant's presence.
///
/// # Errors
///
/// 403 if the caller may not mark attendance on the talk, 404 if the
/// registration or its talk is missing.
pub async fn set_attendance(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(registration_id): Path<RegistrationId>,
    Json(request): Json<AttendanceRequest>,
) -> Result<Json<Registration>, AppError> {
    let registration = state
        .services
        .attendance
        .set_attendance(&caller, registration_id, request.present)
        .await?;
    Ok(Json(registration))
}

/// Registrations held by the caller, or by `?email=` for roster viewers.
///
/// # Errors
///
/// 403 when asking for another email without `canViewAllRosters`.
pub async fn mine(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Query(query): Query<EmailQuery>,
) -> Result<Json<Vec<ParticipantRegistration>>, AppError> {
    let email = query.email.unwrap_or_else(|| caller.email.clone());
    Ok(Json(state.services.ledger.registrations_for(&caller, &email).await?))
}
