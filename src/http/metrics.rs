//! Metrics Registry (C1): Prometheus exposition combining the
//! `metrics`/`metrics-exporter-prometheus` global recorder with the
//! hand-rendered `risk_shadow_alert` three-line gauge (C8).

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::risk::shadow::ShadowComparator;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder once per process. Safe to call
/// more than once; later calls are no-ops.
pub fn install() -> &'static PrometheusHandle {
    HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install prometheus recorder")
    })
}

pub fn record_decision_latency(seconds: f64) {
    metrics::histogram!("risk_decision_latency_seconds").record(seconds);
}

pub fn record_decision(passed: bool) {
    let label = if passed { "pass" } else { "fail" };
    metrics::counter!("risk_decisions_total", "result" => label).increment(1);
}

pub fn record_signal(decision_code: &str, confirmed: bool) {
    metrics::counter!(
        "signals_emitted_total",
        "decision_code" => decision_code.to_string(),
        "confirmed" => confirmed.to_string()
    )
    .increment(1);
}

/// Renders the standard registry plus the shadow-alert lines that don't fit
/// the `metrics` crate's single-gauge-per-name model.
pub fn render(shadow: &ShadowComparator) -> String {
    let handle = install();
    let mut body = handle.render();
    body.push('\n');
    body.push_str(&shadow.prometheus_lines());
    body.push('\n');
    body
}
