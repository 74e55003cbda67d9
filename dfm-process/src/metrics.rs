//! Prometheus metrics behind the `metrics` feature, grounded on
//! `r2e-prometheus`'s presence in the teacher's workspace: a handful of
//! counters, scraped at `GET /metrics` in the default text exposition
//! format.

use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub processes_submitted: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let processes_submitted =
            IntCounter::new("dfm_process_processes_submitted_total", "Processes accepted via POST /process").unwrap();

        registry.register(Box::new(processes_submitted.clone())).unwrap();

        Self {
            registry,
            processes_submitted,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn scrape(state: axum::extract::State<crate::AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).expect("prometheus text encoding never fails");
    ([(CONTENT_TYPE, encoder.format_type().to_string())], buffer)
}
