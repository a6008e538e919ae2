//! GET /api/reports - attendance report over the talks the caller may see.

use crate::server::{AppState, CurrentUser};
use crate::services::reports::Report;
use axum::{Json, extract::State};
use talkboard_web::AppError;

/// Attendance report.
///
/// # Errors
///
/// 403 for roles with no report access.
pub async fn report(State(state): State<AppState>, CurrentUser(caller): CurrentUser) -> Result<Json<Report>, AppError> {
    Ok(Json(state.services.reports.report(&caller).await?))
}
