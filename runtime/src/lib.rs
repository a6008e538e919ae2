//! # Talkboard Runtime
//!
//! Operational plumbing shared by the talkboard services:
//!
//! - **Retry**: bounded exponential backoff for transient store failures and
//!   write conflicts ([`retry`])
//! - **Timeouts**: a per-call deadline around any document store ([`TimedStore`])
//! - **Metrics**: Prometheus recorder and the service counters ([`metrics`])
//! - **Health**: component checks for readiness probes ([`HealthCheck`])
//!
//! ## Example
//!
//! ```ignore
//! use talkboard_runtime::{TimedStore, retry::{RetryPolicy, retry_store}};
//!
//! let store = Arc::new(TimedStore::new(inner, Duration::from_secs(5)));
//! let talk = retry_store(&RetryPolicy::default(), "load_talk", || async {
//!     fetch_talk(store.as_ref(), talk_id).await
//! })
//! .await?;
//! ```

use serde::Serialize;
use talkboard_core::document_store::DocumentStore;

/// Retry logic with exponential backoff
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

/// Per-call store deadlines
pub mod timed_store;

pub use timed_store::TimedStore;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,

    /// Component is not operational
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Health check result for a component
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    /// Name of the component being checked
    pub component: String,

    /// Current health status
    pub status: HealthStatus,

    /// Optional message providing details
    pub message: Option<String>,
}

impl HealthCheck {
    /// Create a healthy check result
    #[must_use]
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Healthy,
            message: None,
        }
    }

    /// Create an unhealthy check result
    #[must_use]
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
        }
    }
}

/// Probe the document store.
pub async fn check_store(store: &dyn DocumentStore) -> HealthCheck {
    match store.ping().await {
        Ok(()) => HealthCheck::healthy("document_store"),
        Err(e) => {
            tracing::warn!(error = %e, "Document store health check failed");
            HealthCheck::unhealthy("document_store", e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_check_constructors() {
        assert!(HealthCheck::healthy("store").status.is_healthy());
        let down = HealthCheck::unhealthy("store", "connection refused");
        assert!(!down.status.is_healthy());
        assert_eq!(down.message.as_deref(), Some("connection refused"));
    }
}
