//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use axum::{Json, extract::State, http::StatusCode};
use std::sync::Arc;
use talkboard_core::document_store::DocumentStore;
use talkboard_runtime::{HealthCheck, check_store};

/// Liveness: the process is up. Does not touch the store.
///
/// ```text
/// GET /health  ->  200 "ok"
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness: the document store answers a ping.
///
/// # Status Codes
///
/// - 200 OK: store reachable
/// - 503 Service Unavailable: store unreachable
///
/// ```text
/// GET /ready
/// {"component":"document_store","status":"Healthy","message":null}
/// ```
///
/// The router state must provide `Arc<dyn DocumentStore>` through `FromRef`.
pub async fn readiness(
    State(store): State<Arc<dyn DocumentStore>>,
) -> (StatusCode, Json<HealthCheck>) {
    let health = check_store(store.as_ref()).await;

    let status = if health.status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use talkboard_runtime::HealthStatus;
    use talkboard_testing::InMemoryDocumentStore;

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_readiness_with_healthy_store() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let (status, Json(health)) = readiness(State(store)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_readiness_with_failing_store() {
        let memory = InMemoryDocumentStore::new();
        memory.fail_next_calls(1);
        let store: Arc<dyn DocumentStore> = Arc::new(memory);

        let (status, Json(health)) = readiness(State(store)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health.status, HealthStatus::Unhealthy);
    }
}
