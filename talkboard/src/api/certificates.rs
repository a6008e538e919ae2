//! Certificate endpoints.
//!
//! - GET  /api/talks/:id/certificate?email=...   - Is a certificate valid right now
//! - POST /api/talks/:id/certificate?email=...   - Issue a signed certificate token
//! - GET  /api/certificates/:token                - Verify a token (public)

use crate::server::{AppState, CurrentUser};
use crate::services::certificates::{CertificateCheck, IssuedCertificate};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use talkboard_core::ids::TalkId;
use talkboard_web::AppError;

/// Whose certificate; the caller when omitted.
#[derive(Debug, Deserialize)]
pub struct CertificateQuery {
    /// Participant email
    pub email: Option<String>,
}

/// Validate a certificate.
///
/// An invalid certificate is a 200 with `valid: false` and a reason.
///
/// # Errors
///
/// 403 when checking another email without roster access to the talk.
pub async fn validate(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(talk_id): Path<TalkId>,
    Query(query): Query<CertificateQuery>,
) -> Result<Json<CertificateCheck>, AppError> {
    let email = query.email.unwrap_or_else(|| caller.email.clone());
    let check = state
        .services
        .certificates
        .validate_for(&caller, talk_id, &email)
        .await?;
    Ok(Json(check))
}

/// Issue a signed token for a certificate that validates.
///
/// # Errors
///
/// 400 if the certificate does not validate, 403 for another email without
/// roster access.
pub async fn issue(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Path(talk_id): Path<TalkId>,
    Query(query): Query<CertificateQuery>,
) -> Result<Json<IssuedCertificate>, AppError> {
    let email = query.email.unwrap_or_else(|| caller.email.clone());
    Ok(Json(state.services.certificates.issue(&caller, talk_id, &email).await?))
}

/// Verify a certificate token against current data.
///
/// # Errors
///
/// 400 for a malformed or forged token.
pub async fn verify(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<CertificateCheck>, AppError> {
    Ok(Json(state.services.certificates.verify(&token).await?))
}
