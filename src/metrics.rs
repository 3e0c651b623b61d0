//! Prometheus metrics HTTP server.
//!
//! Exposes relay statistics in Prometheus text format via HTTP endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use tokio::net::TcpListener;
use tracing::info;

use crate::stats::RelayStats;

/// Start the Prometheus metrics HTTP server.
///
/// Runs in the background and serves metrics at `/metrics`.
/// Returns an error if the server fails to bind to the port.
pub async fn start_metrics_server(
    port: u16,
    stats: Arc<RelayStats>,
) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = TcpListener::bind(addr).await?;
    info!("Prometheus metrics server listening on http://{}/metrics", addr);

    axum::serve(listener, router(stats))
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))
}

fn router(stats: Arc<RelayStats>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(stats)
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Prometheus metrics endpoint.
async fn metrics_handler(State(stats): State<Arc<RelayStats>>) -> impl IntoResponse {
    let output = format_prometheus_metrics(&stats);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        output,
    )
}

fn push_counter(output: &mut String, name: &str, help: &str, value: u64) {
    output.push_str(&format!("# HELP {} {}\n", name, help));
    output.push_str(&format!("# TYPE {} counter\n", name));
    output.push_str(&format!("{} {}\n", name, value));
}

/// Format statistics as Prometheus text format.
fn format_prometheus_metrics(stats: &RelayStats) -> String {
    let summary = stats.summary();
    let mut output = String::with_capacity(2048);

    output.push_str("# HELP wavelog_relay_uptime_seconds Time since the relay started\n");
    output.push_str("# TYPE wavelog_relay_uptime_seconds gauge\n");
    output.push_str(&format!(
        "wavelog_relay_uptime_seconds {:.3}\n",
        summary.elapsed_secs
    ));

    push_counter(
        &mut output,
        "wavelog_relay_datagrams_total",
        "Datagrams received",
        summary.datagrams,
    );
    push_counter(
        &mut output,
        "wavelog_relay_bytes_received_total",
        "Datagram payload bytes received",
        summary.bytes_received,
    );
    push_counter(
        &mut output,
        "wavelog_relay_discarded_total",
        "Datagrams discarded as non-UTF-8 or empty",
        summary.discarded,
    );
    push_counter(
        &mut output,
        "wavelog_relay_conversion_failures_total",
        "XML payloads that could not be converted to ADIF",
        summary.conversion_failures,
    );
    push_counter(
        &mut output,
        "wavelog_relay_failed_attempts_total",
        "Upload attempts that failed at the transport level",
        summary.failed_attempts,
    );

    output.push_str("# HELP wavelog_relay_records_total Records by source and outcome\n");
    output.push_str("# TYPE wavelog_relay_records_total counter\n");
    for (label, value) in [
        ("converted", summary.converted),
        ("passed_through", summary.passed_through),
        ("delivered", summary.delivered),
        ("rejected", summary.rejected),
        ("exhausted", summary.exhausted),
    ] {
        output.push_str(&format!(
            "wavelog_relay_records_total{{status=\"{}\"}} {}\n",
            label, value
        ));
    }

    if let Some(ref latency) = summary.latency_percentiles {
        output.push_str("# HELP wavelog_relay_upload_latency_ms Successful upload latency\n");
        output.push_str("# TYPE wavelog_relay_upload_latency_ms summary\n");
        output.push_str(&format!(
            "wavelog_relay_upload_latency_ms{{quantile=\"0.5\"}} {}\n",
            latency.p50
        ));
        output.push_str(&format!(
            "wavelog_relay_upload_latency_ms{{quantile=\"0.9\"}} {}\n",
            latency.p90
        ));
        output.push_str(&format!(
            "wavelog_relay_upload_latency_ms{{quantile=\"0.99\"}} {}\n",
            latency.p99
        ));
        output.push_str(&format!(
            "wavelog_relay_upload_latency_ms_count {}\n",
            summary.delivered
        ));
    }

    output
}
