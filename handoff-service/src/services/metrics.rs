//! Prometheus recorder and the handoff counters.

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global recorder. Call once at startup, before anything is counted.
pub fn init_metrics() -> Result<(), anyhow::Error> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {}", e))?;

    METRICS_HANDLE
        .set(handle)
        .map_err(|_| anyhow::anyhow!("metrics recorder already initialized"))?;

    describe_counter!(
        "handoff_requests_created_total",
        "Handoff requests created, by mode"
    );
    describe_counter!("handoff_approvals_total", "Handoff requests approved");
    describe_counter!("handoff_consumed_total", "Handoff requests consumed");
    describe_counter!(
        "handoff_tokens_redeemed_total",
        "Impersonation tokens exchanged for an export"
    );
    describe_counter!(
        "handoff_bridge_outcomes_total",
        "Bridge step results, by outcome"
    );
    Ok(())
}

/// Current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// How a bridge step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOutcome {
    Retry,
    Unauthenticated,
    Artifact,
    Export,
    Fallback,
    Root,
}

impl BridgeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeOutcome::Retry => "retry",
            BridgeOutcome::Unauthenticated => "unauthenticated",
            BridgeOutcome::Artifact => "artifact",
            BridgeOutcome::Export => "export",
            BridgeOutcome::Fallback => "fallback",
            BridgeOutcome::Root => "root",
        }
    }
}

pub fn record_bridge_outcome(outcome: BridgeOutcome) {
    counter!("handoff_bridge_outcomes_total", "outcome" => outcome.as_str()).increment(1);
}
