//! Talk API endpoints.
//!
//! - GET    /api/talks                              - List talks (counters reconciled)
//! - POST   /api/talks                              - Create a talk
//! - GET    /api/talks/:id                          - Talk details
//! - PUT    /api/talks/:id                          - Edit a talk
//! - DELETE /api/talks/:id                          - Delete a talk and its registrations
//! - POST   /api/talks/:id/materials                - Attach a material
//! - DELETE /api/talks/:id/materials/:material_id   - Detach a material
//! - POST   /api/talks/:id/reconcile                - Recount registrations
//! - GET    /api/talks/:id/roster                   - Roster with attendance totals

use crate::server::{AppState, CurrentUser};
use crate::services::catalog::{MaterialDraft, TalkDraft, TalkPatch};
use crate::services::ledger::Roster;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use talkboard_core::ids::{MaterialId, TalkId};
use talkboard_core::model::{Material, Speaker, Talk};
use talkboard_core::role::Permission;
use talkboard_web::AppError;

/// Request to create a talk.
#[derive(Debug, Deserialize)]
pub struct CreateTalkRequest {
    /// Title
    pub title: String,
    /// Date, `YYYY-MM-DD`
    pub date: NaiveDate,
    /// Start time, `HH:MM`
    #[serde(deserialize_with = "super::clock_time::deserialize")]
    pub time: NaiveTime,
    /// Venue
    pub location: String,
    /// Speaker; defaults to the caller
    #[serde(default)]
    pub speaker: Option<Speaker>,
    /// Seats
    pub capacity: u32,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
}

/// Request to edit a talk. Omitted fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTalkRequest {
    /// Title
    pub title: Option<String>,
    /// Date
    pub date: Option<NaiveDate>,
    /// Start time
    #[serde(default, deserialize_with = "super::clock_time::deserialize_option")]
    pub time: Option<NaiveTime>,
    /// Venue
    pub location: Option<String>,
    /// Speaker
    pub speaker: Option<Speaker>,
    /// Seats
    pub capacity: Option<u32>,
    /// Description; empty clears it
    pub description: Option<String>,
}

/// A talk as listed, with the seats still open.
#[derive(Debug, Serialize)]
pub struct TalkResponse {
    /// The talk
    #[serde(flatten)]
    pub talk: Talk,
    /// Seats left
    pub seats_left: u32,
}

impl From<Talk> for TalkResponse {
    fn from(talk: Talk) -> Self {
        Self {
            seats_left: talk.seats_left(),
            talk,
        }
    }
}

/// Result of a reconciliation.
#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    /// Talk
    pub talk_id: TalkId,
    /// Registrations counted
    pub registrant_count: u32,
}

/// List every talk, soonest first.
///
/// Public: anyone may browse the catalog.
///
/// ```bash
/// curl http://localhost:8080/api/talks
/// ```
///
/// # Errors
///
/// 503 if the store is unavailable.
pub async fn list_talks(State(state): State<AppState>) -> Result<Json<Vec<TalkResponse>>, AppError> {
    let talks = state.services.catalog.list_talks().await?;
    Ok(Json(talks.into_iter().map(TalkResponse::from).collect()))
}

/// Talk details. Public.
///
/// # Errors
///
/// 404 if the talk does not exist.
pub async fn get_talk(
    State(state): State<AppState>,
    Path(talk_id): Path<TalkId>,
) -> Result<Json<TalkResponse>, AppError> {
    let talk = state.services.catalog.get_talk(talk_id).await?;
    Ok(Json(talk.into()))
}

/// Create a talk.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/talks \
///   -H "Authorization: Bearer <session_token>" \
///   -H "Content-Type: application/json" \
///   -d '{"title": "Async Rust", "date": "2025-06-12", "time": "19:00",
///        "location": "Room 3", "capacity": 40}'
/// ```
///
/// # Errors
///
/// 400 on invalid fields, 403 without `canCreateTalk`.
pub async fn create_talk(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Json(request): Json<CreateTalkRequest>,
) -> Result<(StatusCode, Json<TalkResponse>), AppError> {
    let draft = TalkDraft {
        title: request.title,
        date: request.date,
        time: request.time,
        location: request.location,
        speaker: request.speaker,
        capacity: request.capacity,
        description: request.description,
    };
    let talk = state.services.catalog.create_talk(&caller, draft).await?;
    Ok((StatusCode::CREATED, Json(talk.into())))
}

/// Edit a talk.
///
/// # Errors
///
/// 400 on invalid fields, 403 if the caller may not edit it, 404 if missing.
pub async fn update_talk(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(talk_id): Path<TalkId>,
    Json(request): Json<UpdateTalkRequest>,
) -> Result<Json<TalkResponse>, AppError> {
    let patch = TalkPatch {
        title: request.title,
        date: request.date,
        time: request.time,
        location: request.location,
        speaker: request.speaker,
        capacity: request.capacity,
        description: request.description,
    };
    let talk = state.services.catalog.update_talk(&caller, talk_id, patch).await?;
    Ok(Json(talk.into()))
}

/// Delete a talk and every registration for it.
///
/// The permission check runs here, before the cascade starts.
///
/// # Errors
///
/// 403 without `canEditAnyTalk`, 404 if the talk does not exist.
pub async fn delete_talk(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(talk_id): Path<TalkId>,
) -> Result<StatusCode, AppError> {
    caller.permissions().require(Permission::EditAnyTalk)?;
    state.services.catalog.delete_talk(&caller, talk_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Attach a material.
///
/// # Errors
///
/// 400 on an invalid name or url, 403 if the caller may not edit the talk.
pub async fn add_material(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(talk_id): Path<TalkId>,
    Json(draft): Json<MaterialDraft>,
) -> Result<(StatusCode, Json<Material>), AppError> {
    let material = state.services.catalog.add_material(&caller, talk_id, draft).await?;
    Ok((StatusCode::CREATED, Json(material)))
}

/// Detach a material.
///
/// # Errors
///
/// 403 if the caller may not edit the talk, 404 if talk or material is missing.
pub async fn remove_material(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path((talk_id, material_id)): Path<(TalkId, MaterialId)>,
) -> Result<StatusCode, AppError> {
    state
        .services
        .catalog
        .remove_material(&caller, talk_id, material_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Recount a talk's registrations and repair its counter.
///
/// Restricted to callers who may edit the talk.
///
/// # Errors
///
/// 403 if the caller may not edit the talk, 404 if missing, 500 if the
/// counter could not be corrected.
pub async fn reconcile(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(talk_id): Path<TalkId>,
) -> Result<Json<ReconcileResponse>, AppError> {
    let talk = state.services.catalog.get_talk(talk_id).await?;
    caller.access(&talk).require_edit()?;
    let registrant_count = state.services.ledger.reconcile_count(talk_id).await?;
    Ok(Json(ReconcileResponse {
        talk_id,
        registrant_count,
    }))
}

/// Roster of a talk.
///
/// # Errors
///
/// 403 unless the caller may view this roster, 404 if the talk is missing.
pub async fn roster(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(talk_id): Path<TalkId>,
) -> Result<Json<Roster>, AppError> {
    Ok(Json(state.services.ledger.roster(&caller, talk_id).await?))
}
