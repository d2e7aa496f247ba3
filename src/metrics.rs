use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus exporter and register all application metrics.
/// Returns a `PrometheusHandle` whose `render()` method produces the
/// text/plain Prometheus scrape payload.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    register_metrics();
    handle
}

/// Pre-register series so they appear before the first increment.
pub fn register_metrics() {
    counter!("price_fetch_errors_total").absolute(0);
    counter!("price_cache_hits_total").absolute(0);
    counter!("notification_sweep_events_total").absolute(0);

    for channel in ["webhook", "email"] {
        counter!("notifications_delivered_total", "channel" => channel).absolute(0);
        counter!("notifications_failed_total", "channel" => channel).absolute(0);
    }

    for chain in crate::config::KNOWN_CHAINS {
        counter!("live_dispatch_dropped_total", "chain" => chain.name).absolute(0);
    }

    gauge!("chain_listeners_running").set(0.0);
}
