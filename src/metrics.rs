//! Prometheus metrics

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

pub const BETS_PLACED: &str = "arena_bets_placed_total";
pub const BETS_REJECTED: &str = "arena_bets_rejected_total";
pub const BATTLES_SETTLED: &str = "arena_battles_settled_total";
pub const REFUNDS: &str = "arena_refunds_total";
pub const OVERDUE_BATTLES: &str = "arena_overdue_battles";

/// Install the global recorder and serve `/metrics` on `port`
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    metrics::describe_counter!(BETS_PLACED, "Accepted bets by mode and initial status");
    metrics::describe_counter!(BETS_REJECTED, "Rejected bets by error code");
    metrics::describe_counter!(BATTLES_SETTLED, "Settled battles by mode");
    metrics::describe_counter!(REFUNDS, "Refunded bets by reason");
    metrics::describe_gauge!(OVERDUE_BATTLES, "Open battles past their settlement grace period");
    Ok(())
}
