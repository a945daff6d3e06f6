//! Prometheus metrics module

use crate::error::ServerError;
use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;

/// Server metrics collector
///
/// A detached collector records into whatever global recorder is installed
/// (none in tests) and renders an empty exposition.
#[derive(Clone, Default)]
pub struct ServerMetrics {
    handle: Option<Arc<PrometheusHandle>>,
}

impl ServerMetrics {
    /// Install the Prometheus recorder and return a collector bound to it
    pub fn install() -> Result<Self, ServerError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| ServerError::Config(format!("failed to install Prometheus recorder: {e}")))?;

        Self::register_metrics();

        Ok(Self {
            handle: Some(Arc::new(handle)),
        })
    }

    /// Collector without an exporter
    pub fn detached() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions
    fn register_metrics() {
        describe_counter!(
            "realm_admissions_total",
            Unit::Count,
            "Inbound connections by admission outcome"
        );
        describe_counter!(
            "realm_identity_links_total",
            Unit::Count,
            "Identity-linking pipelines by outcome"
        );
        describe_counter!(
            "realm_balance_mismatches_total",
            Unit::Count,
            "Cached wallet balances that disagreed with the ledger"
        );
        describe_counter!(
            "realm_console_commands_total",
            Unit::Count,
            "Operator console commands by verb"
        );
        describe_counter!(
            "realm_save_passes_total",
            Unit::Count,
            "Full shard save passes"
        );
        describe_counter!("realm_errors_total", Unit::Count, "Total server errors");
        describe_gauge!(
            "realm_shards_ready",
            Unit::Count,
            "Number of shards that finished booting"
        );
    }

    /// Record an admission decision (`shard`, `disallowed`, `full`)
    pub fn record_admission(&self, outcome: &'static str) {
        counter!("realm_admissions_total", "outcome" => outcome).increment(1);
    }

    /// Record a finished identity-linking pipeline (`linked`, `failed`)
    pub fn record_link(&self, outcome: &'static str) {
        counter!("realm_identity_links_total", "outcome" => outcome).increment(1);
    }

    pub fn record_balance_mismatch(&self) {
        counter!("realm_balance_mismatches_total").increment(1);
    }

    pub fn record_command(&self, verb: &str) {
        counter!("realm_console_commands_total", "verb" => verb.to_string()).increment(1);
    }

    pub fn record_save_pass(&self) {
        counter!("realm_save_passes_total").increment(1);
    }

    /// Record server error
    pub fn record_error(&self, error_type: &'static str) {
        counter!("realm_errors_total", "error_type" => error_type).increment(1);
    }

    /// Set shards ready count
    pub fn set_shards_ready(&self, count: usize) {
        gauge!("realm_shards_ready").set(count as f64);
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle
            .as_ref()
            .map(|handle| handle.render())
            .unwrap_or_default()
    }
}
