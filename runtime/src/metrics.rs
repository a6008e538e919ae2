//! Prometheus metrics for the registration services.
//!
//! Counters recorded by the services:
//!
//! - `talkboard_registrations_total{outcome}`: register attempts by outcome
//! - `talkboard_cancellations_total`: successful cancellations
//! - `talkboard_counter_drift_total{operation}`: stored registrant-count found
//!   out of step with the registrations and corrected
//! - `talkboard_attendance_changes_total{present}`: attendance flag writes
//! - `talkboard_store_retries_total{operation}`: retries after transient
//!   failures or write conflicts
//! - `talkboard_store_call_duration_seconds{call}`: document store latency
//!
//! # Example
//!
//! ```rust,no_run
//! use talkboard_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Serve `server.render()` from `/metrics`
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder plus the address its scrape endpoint is served on.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a metrics server for `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the scrape endpoint should bind to.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register metric descriptions and install the global recorder.
    ///
    /// A second call in the same process logs a warning and keeps the first
    /// recorder, so tests may start several servers.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Handle for rendering, if this instance installed the recorder.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "talkboard_registrations_total",
        "Register attempts by outcome"
    );
    describe_counter!(
        "talkboard_cancellations_total",
        "Successful registration cancellations"
    );
    describe_counter!(
        "talkboard_counter_drift_total",
        "Registrant counters found out of step with their registrations"
    );
    describe_counter!(
        "talkboard_attendance_changes_total",
        "Attendance flag writes"
    );
    describe_counter!(
        "talkboard_store_retries_total",
        "Store operations retried after a transient failure or write conflict"
    );
    describe_histogram!(
        "talkboard_store_call_duration_seconds",
        "Document store call latency"
    );
}

/// Recorder for ledger outcomes.
pub struct LedgerMetrics;

impl LedgerMetrics {
    /// Record a register attempt. `outcome` is `ok` or an error kind.
    pub fn record_registration(outcome: &'static str) {
        counter!("talkboard_registrations_total", "outcome" => outcome).increment(1);
    }

    /// Record a cancellation.
    pub fn record_cancellation() {
        counter!("talkboard_cancellations_total").increment(1);
    }

    /// Record a corrected counter.
    pub fn record_drift(operation: &'static str) {
        counter!("talkboard_counter_drift_total", "operation" => operation).increment(1);
    }

    /// Record an attendance write.
    pub fn record_attendance(present: bool) {
        let present = if present { "true" } else { "false" };
        counter!("talkboard_attendance_changes_total", "present" => present).increment(1);
    }
}

/// Recorder for document store calls.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record one store call.
    pub fn record_call(call: &'static str, duration: Duration) {
        histogram!("talkboard_store_call_duration_seconds", "call" => call)
            .record(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert_eq!(server.addr(), addr);
    }

    #[tokio::test]
    async fn test_ledger_metrics_render() {
        let mut server = MetricsServer::new(SocketAddr::from(([127, 0, 0, 1], 0)));
        assert!(server.start().is_ok());

        LedgerMetrics::record_registration("ok");
        LedgerMetrics::record_drift("register");
        StoreMetrics::record_call("commit", Duration::from_millis(3));

        // Another test may have installed the recorder first.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("talkboard_registrations_total"));
            assert!(rendered.contains("talkboard_counter_drift_total"));
        }
    }
}
