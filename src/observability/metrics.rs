//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define admin operation metrics (outcomes, latency)
//! - Track key material generated and retired
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `mailconf_operations_total` (counter): operations by name, outcome
//! - `mailconf_operation_duration_seconds` (histogram): operation latency
//! - `mailconf_keys_generated_total` (counter): DKIM keys by algorithm
//! - `mailconf_keys_retired_total` (counter): key files moved to `old/`
//! - `mailconf_snapshot_domains` / `mailconf_snapshot_accounts` (gauge):
//!   size of the published configuration
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed, so library code and tests never need one

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::dynamic::schema::{ConfigSnapshot, DkimAlgorithm};

/// Outcome label of a finished operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Rejected,
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

/// Installs the Prometheus exporter, listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_operation(operation: &'static str, outcome: Outcome, start: Instant) {
    ::metrics::counter!(
        "mailconf_operations_total",
        "operation" => operation,
        "outcome" => outcome.as_str()
    )
    .increment(1);
    ::metrics::histogram!("mailconf_operation_duration_seconds", "operation" => operation)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_key_generated(algorithm: DkimAlgorithm) {
    ::metrics::counter!("mailconf_keys_generated_total", "algorithm" => algorithm.file_tag()).increment(1);
}

pub fn record_keys_retired(count: usize) {
    if count > 0 {
        ::metrics::counter!("mailconf_keys_retired_total").increment(count as u64);
    }
}

pub fn record_snapshot(snapshot: &ConfigSnapshot) {
    ::metrics::gauge!("mailconf_snapshot_domains").set(snapshot.domains.len() as f64);
    ::metrics::gauge!("mailconf_snapshot_accounts").set(snapshot.accounts.len() as f64);
}
