//! Observability infrastructure for the NRI plugin
//!
//! Provides:
//! - Prometheus metrics (adjustment outcomes, hint errors, handler latency, connection state)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for handler latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PluginMetricsInner> = OnceLock::new();

struct PluginMetricsInner {
    adjustments_total: IntCounterVec,
    hint_errors_total: IntCounterVec,
    create_container_latency_seconds: Histogram,
    connected: IntGauge,
    reconnects_total: IntCounter,
}

impl PluginMetricsInner {
    fn new() -> Self {
        Self {
            adjustments_total: register_int_counter_vec!(
                "fluxbind_nri_adjustments_total",
                "CreateContainer requests by affinity outcome",
                &["outcome"]
            )
            .expect("Failed to register adjustments_total"),

            hint_errors_total: register_int_counter_vec!(
                "fluxbind_nri_hint_errors_total",
                "Cpuset hints rejected, by error kind",
                &["kind"]
            )
            .expect("Failed to register hint_errors_total"),

            create_container_latency_seconds: register_histogram!(
                "fluxbind_nri_create_container_latency_seconds",
                "Time spent handling CreateContainer",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register create_container_latency_seconds"),

            connected: register_int_gauge!(
                "fluxbind_nri_connected",
                "1 while registered with the container runtime"
            )
            .expect("Failed to register connected"),

            reconnects_total: register_int_counter!(
                "fluxbind_nri_reconnects_total",
                "Connection attempts after the first"
            )
            .expect("Failed to register reconnects_total"),
        }
    }
}

/// Plugin metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct PluginMetrics {
    _private: (),
}

impl Default for PluginMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PluginMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PluginMetricsInner {
        GLOBAL_METRICS.get_or_init(PluginMetricsInner::new)
    }

    /// Count one CreateContainer outcome (`applied`, `no_hint`, `rejected`, `internal_fault`)
    pub fn inc_adjustment(&self, outcome: &str) {
        self.inner()
            .adjustments_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn adjustments(&self, outcome: &str) -> u64 {
        self.inner()
            .adjustments_total
            .with_label_values(&[outcome])
            .get()
    }

    pub fn inc_hint_error(&self, kind: &str) {
        self.inner()
            .hint_errors_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn observe_create_container_latency(&self, duration_secs: f64) {
        self.inner()
            .create_container_latency_seconds
            .observe(duration_secs);
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner().connected.set(i64::from(connected));
    }

    pub fn inc_reconnects(&self) {
        self.inner().reconnects_total.inc();
    }

    pub fn reconnects(&self) -> u64 {
        self.inner().reconnects_total.get()
    }
}

/// Structured logger for plugin events
#[derive(Clone)]
pub struct StructuredLogger {
    plugin: String,
}

impl StructuredLogger {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
        }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn log_startup(&self, version: &str, plugin_idx: &str) {
        info!(
            event = "plugin_started",
            plugin = %self.plugin,
            plugin_idx = %plugin_idx,
            version = %version,
            "Starting NRI sidecar plugin"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "plugin_shutdown",
            plugin = %self.plugin,
            reason = %reason,
            "Shutting down NRI plugin"
        );
    }

    pub fn log_connected(&self, socket: &str) {
        info!(
            event = "runtime_connected",
            plugin = %self.plugin,
            socket = %socket,
            "Registered with container runtime"
        );
    }

    pub fn log_disconnected(&self, error: Option<&str>) {
        match error {
            Some(error) => warn!(
                event = "runtime_disconnected",
                plugin = %self.plugin,
                error = %error,
                "NRI plugin failed"
            ),
            None => info!(
                event = "runtime_disconnected",
                plugin = %self.plugin,
                "NRI connection closed"
            ),
        }
    }

    pub fn log_configure(&self, runtime: &str, version: &str) {
        info!(
            event = "configure",
            plugin = %self.plugin,
            runtime = %runtime,
            runtime_version = %version,
            "Configure request"
        );
    }

    pub fn log_affinity_applied(
        &self,
        pod: &str,
        container: &str,
        cpu_list: &str,
        reversed: bool,
    ) {
        info!(
            event = "affinity_applied",
            plugin = %self.plugin,
            pod = %pod,
            container = %container,
            cpus = %cpu_list,
            reversed = reversed,
            "Applying final cpuset to container"
        );
    }

    pub fn log_hint_missing(&self, pod: &str, container: &str, variable: &str) {
        debug!(
            event = "affinity_skipped",
            plugin = %self.plugin,
            pod = %pod,
            container = %container,
            variable = %variable,
            "No cpuset hint found, no affinity will be applied"
        );
    }

    pub fn log_hint_rejected(
        &self,
        pod: &str,
        container: &str,
        hex_mask: &str,
        kind: &str,
        error: &str,
    ) {
        warn!(
            event = "affinity_rejected",
            plugin = %self.plugin,
            pod = %pod,
            container = %container,
            hex_mask = %hex_mask,
            kind = %kind,
            error = %error,
            "Failed to parse cpuset hint, no affinity will be applied"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_metrics_counters() {
        let metrics = PluginMetrics::new();
        let before = metrics.adjustments("applied");

        metrics.inc_adjustment("applied");
        metrics.inc_hint_error("format");
        metrics.observe_create_container_latency(0.0001);
        metrics.set_connected(true);
        metrics.set_connected(false);

        assert!(metrics.adjustments("applied") > before);
    }

    #[test]
    fn test_metrics_handles_share_state() {
        let a = PluginMetrics::new();
        let b = a.clone();
        let before = b.reconnects();
        a.inc_reconnects();
        assert!(b.reconnects() > before);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("fluxbind");
        assert_eq!(logger.plugin(), "fluxbind");
    }
}
