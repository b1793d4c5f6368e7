//! Prometheus metrics helpers.
//!
//! Centralised recorder initialisation and metric descriptions shared by
//! the daemon binaries. Components record through the `metrics` macros;
//! nothing here is required for correctness, and the recorder is optional
//! (tests and the replay CLI run without one).

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Install the Prometheus recorder. Call once at startup, before any
/// metric is recorded.
///
/// # Panics
///
/// Panics when a recorder is already installed.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    register_common_metrics();
    handle
}

/// Like [`init_metrics`] but returns `None` when a recorder already exists.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    PrometheusBuilder::new().install_recorder().ok()
}

/// Serve the `/metrics` endpoint on the given port. Spawns a background
/// task and returns immediately.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "metrics server exited");
        }
    });

    Ok(())
}

fn register_common_metrics() {
    describe_counter!(
        "pipeline_messages_total",
        "Messages processed through the pipeline"
    );
    describe_counter!(
        "pipeline_events_total",
        "Semantic events emitted by the detectors"
    );
    describe_counter!("feed_messages_total", "Raw messages received from the upstream feed");
    describe_counter!("feed_reconnects_total", "Upstream feed reconnect attempts");
    describe_gauge!("feed_connected", "Upstream feed connection state (1=up)");
    describe_counter!("recorder_lines_total", "Lines appended to the live recording log");
    describe_counter!("recorder_write_errors_total", "Recording writes dropped on I/O error");
    describe_counter!("publish_messages_total", "Messages published to the bus");
    describe_gauge!("publish_connected", "Bus connection state (1=up)");
    describe_gauge!(
        "playback_state",
        "Playback status (0=stopped, 1=playing, 2=paused)"
    );
}
