//! Pitwall bridge daemon.
//!
//! Wires the upstream feed into the pipeline, tees every message to the
//! session recorder, projects snapshots and events onto the bus, and
//! serves the REST control surface plus the WebSocket fan-out.
//!
//! # Usage
//!
//! ```bash
//! # Run with defaults (broker on localhost, recordings in ./recordings)
//! pitwall
//!
//! # Point at a broker and follow two drivers
//! PITWALL_MQTT_HOST=broker.local \
//! PITWALL_FAVOURITE_DRIVERS=1,4 \
//! pitwall
//! ```
//!
//! # Graceful Shutdown
//!
//! SIGINT (Ctrl+C) and SIGTERM trigger a clean shutdown: session entities
//! are deregistered, the recorder flushed, and the bus status flipped to
//! offline before exit.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use parking_lot::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pitwall_core::metrics::{init_metrics, start_metrics_server};
use pitwall_ingest::PlaybackController;
use pitwall_publish::{MqttClient, Publisher};
use pitwall_serve::{bridge, router, AppState, Config};

/// Live timing to MQTT bridge with session recording and replay.
#[derive(Parser, Debug)]
#[command(name = "pitwall")]
#[command(about = "Live timing to MQTT bridge", long_about = None)]
#[command(version)]
struct Args {
    /// Path to .env file (optional).
    #[arg(long, env = "DOTENV_PATH", default_value = ".env")]
    dotenv: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if std::path::Path::new(&args.dotenv).exists() {
        dotenvy::from_path(&args.dotenv)?;
        eprintln!("Loaded environment from {}", args.dotenv);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,pitwall=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    if config.metrics_port > 0 {
        let handle = init_metrics();
        start_metrics_server(config.metrics_port, handle)
            .await
            .context("starting metrics server")?;
    }

    // Bus connection: subscribes the playback command topic, carries the
    // offline Last-Will.
    let publisher = Publisher::new(config.publisher_config());
    let command_topic = publisher.command_topic();
    let (mqtt, inbound) = MqttClient::connect(&config.mqtt_config(), vec![command_topic.clone()]);
    let publisher = Arc::new(Mutex::new(publisher));

    // Season-long entities exist independent of any session.
    {
        let messages = publisher.lock().register_persistent_entities();
        let mqtt = mqtt.clone();
        tokio::spawn(async move {
            // Give the first ConnAck a moment; a dropped batch here only
            // delays discovery until the next restart.
            for _ in 0..50 {
                if mqtt.is_connected() {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
            let _ = mqtt.publish_all(&messages).await;
        });
    }

    // Playback controller plus its bus fan-out and command loop.
    let controller = PlaybackController::new();
    bridge::spawn_playback_fanout(controller.clone(), Arc::clone(&publisher), mqtt.clone());
    bridge::spawn_command_loop(inbound, controller.clone(), command_topic);

    // Live feed, unless disabled for replay-only deployments.
    let config = Arc::new(config);
    let feed = config.live_enabled.then(|| {
        bridge::spawn_live(Arc::clone(&config), Arc::clone(&publisher), mqtt.clone())
    });

    // Control surface.
    let state = AppState::new((*config).clone(), controller);
    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "control surface listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Clean teardown: stop the feed loop, retire session entities, flip
    // the bus status to offline.
    tracing::info!("shutting down");
    if let Some(feed) = feed {
        feed.stop();
    }
    let messages = publisher.lock().deregister_session_entities();
    let _ = mqtt.publish_all(&messages).await;
    mqtt.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
