use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::error;

/// Metrics installs the process-wide Prometheus recorder and records the
/// counters the orchestrator and pipeline report against. Grounded on the
/// teacher's `PrometheusBuilder::new().with_http_listener(...)` startup
/// (`main.rs`).
pub struct Metrics;

impl Metrics {
    /// Install binds a Prometheus scrape endpoint at `addr` and installs the
    /// global recorder. Must run once, before any `metrics::counter!` call.
    pub fn install(addr: SocketAddr) {
        let builder = PrometheusBuilder::new().with_http_listener(addr);
        tokio::spawn(async move {
            if let Err(e) = builder.install() {
                error!(error = %e, "failed to install prometheus recorder");
            }
        });
    }

    /// Record_run_outcome increments the run-outcome counter for `outcome`.
    pub fn record_run_outcome(outcome: &'static str) {
        metrics::counter!("ocean_run_outcome_total", "outcome" => outcome).increment(1);
    }

    /// Record_kind_counters folds one kind's run-end counters into the
    /// cumulative per-kind Prometheus counters.
    pub fn record_kind_counters(kind: &str, fetched: u64, upserted: u64, failed: u64, deleted: u64) {
        let kind = kind.to_string();
        metrics::counter!("ocean_kind_fetched_total", "kind" => kind.clone()).increment(fetched);
        metrics::counter!("ocean_kind_upserted_total", "kind" => kind.clone()).increment(upserted);
        metrics::counter!("ocean_kind_failed_total", "kind" => kind.clone()).increment(failed);
        metrics::counter!("ocean_kind_deleted_total", "kind" => kind).increment(deleted);
    }

    /// Record_webhook_delivery increments the webhook-delivery counter for
    /// `processor_id`, labeled by whether it was accepted or rejected.
    pub fn record_webhook_delivery(processor_id: &str, accepted: bool) {
        let status = if accepted { "accepted" } else { "rejected" };
        metrics::counter!(
            "ocean_webhook_deliveries_total",
            "processor" => processor_id.to_string(),
            "status" => status,
        )
        .increment(1);
    }
}
