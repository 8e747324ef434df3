//! Prometheus metrics exposition server.
//!
//! This module provides an HTTP server that exposes discord2pushover metrics
//! in Prometheus format on a configurable port.

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Global flag to track if recorder is installed (for tests)
static RECORDER_INSTALLED: OnceLock<()> = OnceLock::new();

/// Register all metric descriptions for Prometheus.
///
/// This should be called once at startup after the recorder is installed.
/// Descriptions provide HELP text in the Prometheus output.
pub fn register_metric_descriptions() {
    use metrics::{describe_counter, describe_gauge};

    // Counters
    describe_counter!(
        "d2p_events_total",
        "Total number of Discord events handled, by kind"
    );
    describe_counter!(
        "d2p_rules_matched_total",
        "Total number of events for which a rule matched"
    );
    describe_counter!(
        "d2p_notifications_sent_total",
        "Total number of notifications accepted by Pushover"
    );
    describe_counter!(
        "d2p_notifications_suppressed_total",
        "Total number of notifications skipped because one at least as urgent was already sent"
    );
    describe_counter!(
        "d2p_notify_errors_total",
        "Total number of notification sends that failed or were rejected"
    );
    describe_counter!(
        "d2p_ack_transitions_total",
        "Total number of tracked emergency notifications resolved, by final state"
    );
    describe_counter!(
        "d2p_gateway_reconnections_total",
        "Total number of Discord gateway reconnection attempts"
    );

    // Gauges
    describe_gauge!(
        "d2p_tracked_notifications",
        "Current number of emergency notifications awaiting acknowledgement"
    );
    describe_gauge!(
        "d2p_build_info",
        "Build information with version label (always 1)"
    );
}

/// Metrics server for Prometheus exposition.
///
/// Starts an HTTP server that serves metrics on `/metrics` and
/// a health check on `/health`.
pub struct MetricsServer {
    port: u16,
    /// Optional channel to signal when the recorder is ready.
    /// This allows callers to wait for the recorder to be installed
    /// before emitting metrics (avoiding the race condition where
    /// metrics are lost if emitted before the recorder is ready).
    ready_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MetricsServer {
    /// Create a new metrics server bound to the given port.
    ///
    /// Use port 0 to let the OS assign an available port (useful for testing).
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ready_tx: None,
        }
    }

    /// Create a new metrics server with a ready signal channel.
    ///
    /// The channel will be signaled once the Prometheus recorder is installed
    /// and ready to receive metrics. This prevents the race condition where
    /// metrics emitted before the recorder is ready are silently lost.
    pub fn with_ready_signal(port: u16, ready_tx: tokio::sync::oneshot::Sender<()>) -> Self {
        Self {
            port,
            ready_tx: Some(ready_tx),
        }
    }

    /// Returns the configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the metrics server until cancelled.
    ///
    /// This method installs the global metrics recorder and starts
    /// an HTTP server. It will block until the cancellation token
    /// is triggered.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to start or encounters
    /// a fatal error during operation.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();

        // Build the Prometheus exporter with HTTP server
        // Note: The recorder can only be installed once per process
        let builder = PrometheusBuilder::new();
        builder
            .with_http_listener(addr)
            .install()
            .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

        // Mark that the recorder is installed
        let _ = RECORDER_INSTALLED.set(());

        // Register descriptions after recorder is installed
        register_metric_descriptions();

        // Signal that the recorder is ready (if a channel was provided)
        if let Some(tx) = self.ready_tx {
            let _ = tx.send(());
        }

        info!(port = self.port, "Metrics server started on /metrics");

        // Wait for cancellation
        cancel.cancelled().await;

        info!("Metrics server shutting down");

        Ok(())
    }
}

/// Check if the metrics recorder has been installed.
///
/// This is useful for tests to know if metrics will be recorded.
pub fn is_recorder_installed() -> bool {
    RECORDER_INSTALLED.get().is_some()
}

/// Initialize all known metrics to their default values.
///
/// This function should be called immediately after the Prometheus recorder
/// is installed to ensure all metrics are visible in `/metrics` from startup,
/// even before any events occur.
///
/// # Arguments
///
/// * `rule_names` - List of rule names to initialize per-rule counters
pub fn initialize_metrics(rule_names: &[&str]) {
    use metrics::{counter, gauge};

    gauge!("d2p_build_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    gauge!("d2p_tracked_notifications").set(0.0);

    counter!("d2p_notify_errors_total").absolute(0);
    counter!("d2p_gateway_reconnections_total").absolute(0);
    for kind in ["message_create", "message_update", "reaction_add"] {
        counter!("d2p_events_total", "kind" => kind).absolute(0);
    }
    for state in ["acknowledged", "expired", "failed"] {
        counter!("d2p_ack_transitions_total", "state" => state).absolute(0);
    }

    for rule_name in rule_names {
        counter!("d2p_rules_matched_total", "rule_name" => rule_name.to_string()).absolute(0);
        counter!("d2p_notifications_sent_total", "rule_name" => rule_name.to_string())
            .absolute(0);
        counter!("d2p_notifications_suppressed_total", "rule_name" => rule_name.to_string())
            .absolute(0);
    }

    tracing::info!(rule_count = rule_names.len(), "Metrics initialized to zero");
}
