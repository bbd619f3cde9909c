//! Prometheus metrics
//!
//! The passive observability surface: active sessions, admission rejections,
//! session outcomes, dropped outbound frames. Per-stage latency histograms
//! are recorded by the turn controller.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and return the render handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub fn set_active_sessions(count: usize) {
    metrics::gauge!("call_agent_active_sessions").set(count as f64);
}

pub fn record_admission_rejected() {
    metrics::counter!("call_agent_admission_rejected_total").increment(1);
}

pub fn record_session_started() {
    metrics::counter!("call_agent_sessions_started_total").increment(1);
}

pub fn record_session_closed(outcome: call_agent_core::CallOutcome) {
    metrics::counter!("call_agent_sessions_closed_total", "outcome" => outcome.to_string())
        .increment(1);
}

pub fn record_dropped_frames(count: u64) {
    if count > 0 {
        metrics::counter!("call_agent_outbound_frames_dropped_total").increment(count);
    }
}
