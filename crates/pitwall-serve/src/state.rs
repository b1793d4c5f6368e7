//! Application state and configuration.

use std::path::PathBuf;
use std::sync::Arc;

use pitwall_ingest::PlaybackController;
use pitwall_publish::{MqttConfig, NotifierConfig, PublisherConfig};

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP bind address (e.g. "0.0.0.0:8080").
    pub bind_addr: String,

    /// Directory holding session recordings.
    pub recordings_dir: PathBuf,

    /// MQTT broker host.
    pub mqtt_host: String,

    /// MQTT broker port.
    pub mqtt_port: u16,

    /// Optional MQTT credentials.
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,

    /// Bus topic prefix.
    pub topic_prefix: String,

    /// Home-automation discovery prefix.
    pub discovery_prefix: String,

    /// Racing numbers that get per-driver entities.
    pub favourite_drivers: Vec<String>,

    /// Notifier device base topic, when one is configured.
    pub notifier_prefix: Option<String>,

    /// Base URL of the historical archive.
    pub archive_base_url: String,

    /// Connect to the live upstream feed at startup.
    pub live_enabled: bool,

    /// Prometheus metrics port (0 disables).
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables. Everything has a
    /// sensible default; MQTT credentials and the notifier are optional.
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr =
            std::env::var("PITWALL_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let recordings_dir = std::env::var("PITWALL_RECORDINGS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./recordings"));

        let mqtt_host =
            std::env::var("PITWALL_MQTT_HOST").unwrap_or_else(|_| "localhost".to_string());
        let mqtt_port = std::env::var("PITWALL_MQTT_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(1883);
        let mqtt_username = std::env::var("PITWALL_MQTT_USERNAME").ok();
        let mqtt_password = std::env::var("PITWALL_MQTT_PASSWORD").ok();

        let topic_prefix =
            std::env::var("PITWALL_TOPIC_PREFIX").unwrap_or_else(|_| "f12mqtt".to_string());
        let discovery_prefix = std::env::var("PITWALL_DISCOVERY_PREFIX")
            .unwrap_or_else(|_| "homeassistant".to_string());

        let favourite_drivers: Vec<String> = std::env::var("PITWALL_FAVOURITE_DRIVERS")
            .map(|s| {
                s.split(',')
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let notifier_prefix = std::env::var("PITWALL_NOTIFIER_PREFIX")
            .ok()
            .filter(|p| !p.is_empty());

        let archive_base_url = std::env::var("PITWALL_ARCHIVE_URL")
            .unwrap_or_else(|_| "https://livetiming.formula1.com/static".to_string());

        let live_enabled = std::env::var("PITWALL_LIVE")
            .map(|v| v != "0" && v != "false")
            .unwrap_or(true);

        let metrics_port = std::env::var("PITWALL_METRICS_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(0);

        tracing::info!(
            bind_addr = %bind_addr,
            recordings_dir = %recordings_dir.display(),
            mqtt = %format!("{mqtt_host}:{mqtt_port}"),
            prefix = %topic_prefix,
            favourites = favourite_drivers.len(),
            live = live_enabled,
            "configuration loaded"
        );

        Ok(Self {
            bind_addr,
            recordings_dir,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            topic_prefix,
            discovery_prefix,
            favourite_drivers,
            notifier_prefix,
            archive_base_url,
            live_enabled,
            metrics_port,
        })
    }

    /// Broker settings for the publish crate.
    pub fn mqtt_config(&self) -> MqttConfig {
        MqttConfig {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            username: self.mqtt_username.clone(),
            password: self.mqtt_password.clone(),
            client_id: "pitwall".to_string(),
            prefix: self.topic_prefix.clone(),
        }
    }

    /// Projection settings for the publish crate.
    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            prefix: self.topic_prefix.clone(),
            discovery_prefix: self.discovery_prefix.clone(),
            favourite_drivers: self.favourite_drivers.clone(),
            notifier: self.notifier_prefix.clone().map(|prefix| NotifierConfig { prefix }),
        }
    }
}

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,

    /// The playback controller driven by the control surface.
    pub controller: PlaybackController,
}

impl AppState {
    pub fn new(config: Config, controller: PlaybackController) -> Self {
        AppState {
            config: Arc::new(config),
            controller,
        }
    }
}
