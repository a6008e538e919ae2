//! User administration endpoints. Administrators only.
//!
//! - GET    /api/users               - List users
//! - POST   /api/users               - Create or update a user
//! - PUT    /api/users               - Change a role `{"userId": ..., "role": ...}`
//! - DELETE /api/users?userId=...    - Delete a user

use crate::server::{AppState, CurrentUser};
use crate::services::users::UserProfile;
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use talkboard_core::ids::UserId;
use talkboard_core::model::User;
use talkboard_web::AppError;

/// Role change request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRequest {
    /// Target user
    pub user_id: UserId,
    /// New role
    pub role: String,
}

/// Deletion target.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    /// Target user
    pub user_id: UserId,
}

/// List users.
///
/// # Errors
///
/// 403 for non-administrators.
pub async fn list(State(state): State<AppState>, CurrentUser(caller): CurrentUser) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.services.users.list(&caller).await?))
}

/// Create or update a user.
///
/// # Errors
///
/// 400 on an invalid profile, 403 for non-administrators.
pub async fn upsert(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Json(profile): Json<UserProfile>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.services.users.upsert(&caller, profile).await?))
}

/// Change a user's role. Open sessions of that user end.
///
/// # Errors
///
/// 400 for an unknown role or self-demotion, 403 for non-administrators,
/// 404 if the user does not exist.
pub async fn set_role(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Json(request): Json<RoleRequest>,
) -> Result<Json<User>, AppError> {
    let user = state
        .services
        .users
        .set_role(&caller, &request.user_id, &request.role)
        .await?;
    Ok(Json(user))
}

/// Delete a user.
///
/// # Errors
///
/// 400 when deleting oneself, 403 for non-administrators, 404 if missing.
pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Query(query): Query<UserQuery>,
) -> Result<StatusCode, AppError> {
    state.services.users.delete_user(&caller, &query.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
