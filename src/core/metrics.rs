use std::sync::OnceLock;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    describe_counter!("http_requests_total", "HTTP requests by method, path and status");
    describe_histogram!("http_request_duration_seconds", Unit::Seconds, "HTTP request latency");
    describe_counter!("model_requests_total", "Language model calls by operation and outcome");
    describe_histogram!(
        "model_request_duration_seconds",
        Unit::Seconds,
        "Language model call latency"
    );
    describe_counter!("evaluations_total", "Completed script evaluations by mode");
    describe_gauge!("chat_sessions_active", "Chat sessions currently held in memory");
    describe_counter!("chat_sessions_evicted_total", "Chat sessions evicted to stay under capacity");
}
