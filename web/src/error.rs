//! Error types for web handlers.
//!
//! [`AppError`] bridges [`DomainError`] and [`AuthError`] to HTTP responses
//! through Axum's `IntoResponse`.
//!
//! | error | status |
//! |---|---|
//! | validation | 400 |
//! | missing/expired session | 401 |
//! | permission denied | 403 |
//! | talk, user or registration not found | 404 |
//! | capacity, duplicate, self-registration | 409 |
//! | store unavailable | 503 |
//! | internal inconsistency | 500 |

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;
use talkboard_auth::AuthError;
use talkboard_core::error::DomainError;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(app): State<AppState>, Path(id): Path<TalkId>)
///     -> Result<Json<Talk>, AppError>
/// {
///     let talk = app.catalog.get_talk(id).await?;
///     Ok(Json(talk))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code: code.into(),
            source: None,
        }
    }

    /// Attach the underlying error for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "BAD_REQUEST")
    }

    /// Create a 400 validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "VALIDATION_ERROR")
    }

    /// Create a 401 Unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message, "UNAUTHORIZED")
    }

    /// Create a 403 Forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message, "FORBIDDEN")
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND",
        )
    }

    /// Create a 409 Conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message, code)
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, "INTERNAL_SERVER_ERROR")
    }

    /// Create a 502 error for a failing upstream identity provider.
    #[must_use]
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message, "UPSTREAM_ERROR")
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message, "SERVICE_UNAVAILABLE")
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Request failed"
                ),
            }
        } else {
            tracing::debug!(status = %self.status, code = %self.code, "Request rejected");
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        let message = err.to_string();
        match &err {
            DomainError::Validation(_) => Self::validation(message),
            DomainError::PermissionDenied { .. } => {
                Self::new(StatusCode::FORBIDDEN, message, "PERMISSION_DENIED")
            }
            DomainError::CapacityExceeded { .. } => Self::conflict(message, "CAPACITY_EXCEEDED"),
            DomainError::DuplicateRegistration { .. } => {
                Self::conflict(message, "DUPLICATE_REGISTRATION")
            }
            DomainError::SelfRegistrationForbidden { .. } => {
                Self::conflict(message, "SELF_REGISTRATION_FORBIDDEN")
            }
            DomainError::RegistrationNotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, message, "REGISTRATION_NOT_FOUND")
            }
            DomainError::NotFound { .. } => Self::new(StatusCode::NOT_FOUND, message, "NOT_FOUND"),
            DomainError::StoreUnavailable(_) => {
                Self::unavailable("The data store is temporarily unavailable")
                    .with_source(anyhow::Error::new(err))
            }
            DomainError::InternalInconsistency(_) => {
                Self::internal("An internal error occurred").with_source(anyhow::Error::new(err))
            }
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::MissingToken | AuthError::SessionNotFound | AuthError::SessionExpired => {
                Self::unauthorized(message)
            }
            AuthError::OAuthCodeInvalid | AuthError::OAuthStateInvalid => {
                Self::new(StatusCode::BAD_REQUEST, message, "SIGN_IN_FAILED")
            }
            AuthError::EmailNotVerified => {
                Self::new(StatusCode::FORBIDDEN, message, "EMAIL_NOT_VERIFIED")
            }
            AuthError::OAuthTokenExchangeFailed(_) | AuthError::OAuthUserInfoFailed(_) => {
                Self::bad_gateway("The identity provider could not complete sign-in")
                    .with_source(anyhow::Error::new(err))
            }
            AuthError::ProviderNotConfigured => Self::unavailable(message),
            AuthError::Store(store) => DomainError::from(store).into(),
            AuthError::InternalError(_) => {
                Self::internal("An internal error occurred").with_source(anyhow::Error::new(err))
            }
        }
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talkboard_core::document_store::StoreError;
    use talkboard_core::ids::TalkId;
    use talkboard_core::role::Permission;

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn test_not_found() {
        let err = AppError::not_found("Talk", "123");
        assert_eq!(err.to_string(), "[NOT_FOUND] Talk with id 123 not found");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_domain_error_statuses() {
        let talk_id = TalkId::new();
        let cases = [
            (DomainError::validation("title is required"), StatusCode::BAD_REQUEST),
            (
                DomainError::PermissionDenied {
                    permission: Permission::ManageUsers,
                },
                StatusCode::FORBIDDEN,
            ),
            (
                DomainError::CapacityExceeded { talk_id, capacity: 1 },
                StatusCode::CONFLICT,
            ),
            (
                DomainError::DuplicateRegistration {
                    talk_id,
                    email: "a@x.com".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                DomainError::SelfRegistrationForbidden {
                    talk_id,
                    email: "a@x.com".into(),
                },
                StatusCode::CONFLICT,
            ),
            (DomainError::RegistrationNotFound("a@x.com".into()), StatusCode::NOT_FOUND),
            (DomainError::talk_not_found(talk_id), StatusCode::NOT_FOUND),
            (DomainError::StoreUnavailable("down".into()), StatusCode::SERVICE_UNAVAILABLE),
            (
                DomainError::InternalInconsistency("drift".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let err = AppError::from(DomainError::InternalInconsistency("talk t1 drifted".into()));
        assert!(!err.to_string().contains("t1"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_auth_error_statuses() {
        assert_eq!(AppError::from(AuthError::MissingToken).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::from(AuthError::SessionExpired).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::from(AuthError::OAuthStateInvalid).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::from(AuthError::EmailNotVerified).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::from(AuthError::Store(StoreError::Unavailable("down".into()))).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_conflict_codes_distinguish_causes() {
        let talk_id = TalkId::new();
        let full = AppError::from(DomainError::CapacityExceeded { talk_id, capacity: 3 });
        assert_eq!(full.code(), "CAPACITY_EXCEEDED");
    }
}
