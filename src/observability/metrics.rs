//! Metrics collection and exposition.
//!
//! # Metrics
//! - `idgw_config_reloads_total` (counter): reloads by outcome
//! - `idgw_config_reload_duration_seconds` (histogram): reload latency
//! - `idgw_config_snapshot_version` (gauge): version of the current snapshot
//! - `idgw_config_routes` / `idgw_config_clusters` (gauge): snapshot sizes
//! - `idgw_config_rows_skipped_total` (counter): rows dropped by kind
//! - `idgw_cache_lookups_total` (counter): lookups by result
//! - `idgw_cache_regenerations_total` (counter): factory invocations
//! - `idgw_cache_errors_total` (counter): adapter failures by operation
//! - `idgw_cache_warmup_total` (counter): warmup categories by outcome
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users
//!   and tests pay nothing
//! - Labels are low-cardinality enums, never cache keys or ids

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Outcome label for reload and warmup counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

pub fn record_reload(outcome: Outcome, elapsed: Duration) {
    counter!("idgw_config_reloads_total", "outcome" => outcome.as_str()).increment(1);
    histogram!("idgw_config_reload_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_snapshot(version: u64, routes: usize, clusters: usize) {
    gauge!("idgw_config_snapshot_version").set(version as f64);
    gauge!("idgw_config_routes").set(routes as f64);
    gauge!("idgw_config_clusters").set(clusters as f64);
}

/// `kind` is `route` or `cluster`.
pub fn record_row_skipped(kind: &'static str) {
    counter!("idgw_config_rows_skipped_total", "kind" => kind).increment(1);
}

/// `result` is `hit`, `miss` or `null`.
pub fn record_cache_lookup(result: &'static str) {
    counter!("idgw_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_regeneration() {
    counter!("idgw_cache_regenerations_total").increment(1);
}

pub fn record_cache_error(operation: &'static str) {
    counter!("idgw_cache_errors_total", "operation" => operation).increment(1);
}

pub fn record_warmup(category: &'static str, outcome: Outcome) {
    counter!(
        "idgw_cache_warmup_total",
        "category" => category,
        "outcome" => outcome.as_str()
    )
    .increment(1);
}
