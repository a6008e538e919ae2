//! Live registration feeds over WebSocket.
//!
//! - GET /api/talks/:id/live   - A talk's registrations as they change
//! - GET /api/me/live          - The caller's registrations as they change
//!
//! Browsers cannot set headers on a WebSocket handshake, so the session
//! token may be passed as `?access_token=`.

use crate::server::{AppState, CurrentUser};
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    response::Response,
};
use talkboard_core::ids::TalkId;
use talkboard_web::AppError;
use talkboard_web::handlers::stream_views;

/// Stream a talk's roster.
///
/// # Errors
///
/// 403 unless the caller may view the roster, 404 if the talk is missing.
pub async fn talk_feed(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(talk_id): Path<TalkId>,
) -> Result<Response, AppError> {
    let feed = state.services.ledger.subscribe_talk(&caller, talk_id).await?;
    Ok(stream_views(ws, feed))
}

/// Stream the caller's own registrations.
///
/// # Errors
///
/// 503 if the subscription cannot be set up.
pub async fn participant_feed(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
) -> Result<Response, AppError> {
    let feed = state
        .services
        .ledger
        .subscribe_participant(&caller, &caller.email)
        .await?;
    Ok(stream_views(ws, feed))
}
