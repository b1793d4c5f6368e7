//! Upstream live-timing feed client.
//!
//! The upstream feed is a hub-and-topic push protocol: an HTTPS negotiate
//! call hands out a connection token, then a persistent WebSocket carries
//! JSON frames. The initial hub reply (`R`) is a full per-topic snapshot;
//! streaming frames (`M`) carry `[topic, data, timestamp]` diffs.
//!
//! Two topics arrive compressed (`CarData.z`, `Position.z`): base64 over
//! raw deflate. The client inflates those and strips the `.z` suffix before
//! anything downstream sees them, so the pipeline only ever handles plain
//! JSON diffs.
//!
//! The client reconnects with a fixed 2-second backoff and reports its
//! lifecycle on the event channel; feed errors never propagate into the
//! pipeline.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use flate2::read::DeflateDecoder;
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{COOKIE, USER_AGENT};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use pitwall_core::TimelineEntry;

use crate::error::{Error, Result};

/// Topics subscribed on connect.
pub const FEED_TOPICS: &[&str] = &[
    "TimingData",
    "TrackStatus",
    "DriverList",
    "RaceControlMessages",
    "SessionInfo",
    "SessionData",
    "LapCount",
    "WeatherData",
    "TimingAppData",
    "ExtrapolatedClock",
    "Heartbeat",
    "CarData.z",
    "Position.z",
    "TopThree",
    "PitLaneTimeCollection",
];

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// HTTPS endpoint for the negotiate handshake.
    pub negotiate_url: String,

    /// WebSocket endpoint for the persistent connection.
    pub ws_url: String,

    /// Topics to subscribe. Defaults to [`FEED_TOPICS`].
    pub topics: Vec<String>,

    /// Fixed backoff between reconnect attempts.
    pub reconnect_delay: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            negotiate_url: "https://livetiming.formula1.com/signalr".to_string(),
            ws_url: "wss://livetiming.formula1.com/signalr".to_string(),
            topics: FEED_TOPICS.iter().map(|t| t.to_string()).collect(),
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

/// Lifecycle and data events emitted by the client.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// The WebSocket is up and subscribed.
    Connected,
    /// The hub's initial reply: a map from topic name to full payload,
    /// compressed topics already inflated and renamed.
    InitialState(Value),
    /// One streamed diff.
    Message(TimelineEntry),
    /// The connection dropped; a reconnect follows unless stopped.
    Disconnected,
}

/// Persistent feed client. `run` owns the connection loop; `stop` makes it
/// return after the current connection ends.
pub struct FeedClient {
    config: FeedConfig,
    running: Arc<AtomicBool>,
}

impl FeedClient {
    pub fn new(config: FeedConfig) -> Self {
        FeedClient {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Signal the connection loop to stop after the current attempt.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the connect/reconnect loop until [`FeedClient::stop`] is called
    /// or the event receiver is dropped.
    pub async fn run(&self, tx: mpsc::Sender<FeedEvent>) {
        self.running.store(true, Ordering::SeqCst);

        while self.running.load(Ordering::SeqCst) {
            match self.connect_once(&tx).await {
                Ok(()) => info!("feed connection closed"),
                Err(e) => warn!(error = %e, "feed connection failed"),
            }
            gauge!("feed_connected").set(0.0);

            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            if tx.send(FeedEvent::Disconnected).await.is_err() {
                // Consumer gone: nothing left to feed.
                break;
            }
            counter!("feed_reconnects_total").increment(1);
            tokio::time::sleep(self.config.reconnect_delay).await;
        }

        self.running.store(false, Ordering::SeqCst);
    }

    async fn connect_once(&self, tx: &mpsc::Sender<FeedEvent>) -> Result<()> {
        let (token, cookie) = self.negotiate().await?;

        let connection_data = json!([{"name": "Streaming"}]).to_string();
        let url = reqwest::Url::parse_with_params(
            &format!("{}/connect", self.config.ws_url),
            &[
                ("clientProtocol", "1.5"),
                ("transport", "webSockets"),
                ("connectionToken", token.as_str()),
                ("connectionData", connection_data.as_str()),
            ],
        )
        .map_err(|e| Error::Feed(format!("bad WebSocket URL: {e}")))?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(Error::WebSocket)?;
        request
            .headers_mut()
            .insert(USER_AGENT, "BestHTTP".parse().expect("static header"));
        if let Some(cookie) = cookie {
            if let Ok(value) = cookie.parse() {
                request.headers_mut().insert(COOKIE, value);
            }
        }

        let (mut ws, _) = connect_async(request).await?;

        let subscribe = json!({
            "H": "Streaming",
            "M": "Subscribe",
            "A": [self.config.topics],
            "I": 1
        });
        ws.send(Message::Text(subscribe.to_string().into())).await?;

        gauge!("feed_connected").set(1.0);
        if tx.send(FeedEvent::Connected).await.is_err() {
            return Ok(());
        }
        info!(topics = self.config.topics.len(), "feed subscribed");

        while self.running.load(Ordering::SeqCst) {
            let Some(frame) = ws.next().await else {
                return Ok(());
            };
            match frame? {
                Message::Text(text) => {
                    for event in decode_frame(&text) {
                        counter!("feed_messages_total").increment(1);
                        if tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                Message::Ping(payload) => {
                    ws.send(Message::Pong(payload)).await?;
                }
                Message::Close(_) => return Ok(()),
                _ => {}
            }
        }

        Ok(())
    }

    /// Negotiate a connection token; returns the token and any session
    /// cookie the server wants echoed on the WebSocket handshake.
    async fn negotiate(&self) -> Result<(String, Option<String>)> {
        let connection_data = json!([{"name": "Streaming"}]).to_string();
        let url = reqwest::Url::parse_with_params(
            &format!("{}/negotiate", self.config.negotiate_url),
            &[
                ("clientProtocol", "1.5"),
                ("connectionData", connection_data.as_str()),
            ],
        )
        .map_err(|e| Error::Feed(format!("bad negotiate URL: {e}")))?;

        let response = reqwest::get(url).await?.error_for_status()?;
        let cookie = response
            .headers()
            .get("set-cookie")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(String::from);

        let body: Value = response.json().await?;
        let token = body
            .get("ConnectionToken")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Feed("negotiate reply carries no token".to_string()))?
            .to_string();

        debug!("feed negotiated");
        Ok((token, cookie))
    }
}

/// Decode one WebSocket text frame into feed events. Keepalives (`{}`) and
/// unrecognised frames decode to nothing.
fn decode_frame(text: &str) -> Vec<FeedEvent> {
    let Ok(frame) = serde_json::from_str::<Value>(text) else {
        return Vec::new();
    };

    let mut events = Vec::new();

    if let Some(reply) = frame.get("R") {
        events.push(FeedEvent::InitialState(normalize_snapshot(reply)));
    }

    if let Some(messages) = frame.get("M").and_then(Value::as_array) {
        for message in messages {
            if message.get("M").and_then(Value::as_str) != Some("feed") {
                continue;
            }
            let Some(args) = message.get("A").and_then(Value::as_array) else {
                continue;
            };
            let (Some(topic), Some(data), Some(ts)) = (
                args.first().and_then(Value::as_str),
                args.get(1),
                args.get(2).and_then(Value::as_str),
            ) else {
                continue;
            };

            let (topic, data) = match normalize_topic_data(topic, data) {
                Some(pair) => pair,
                None => continue,
            };

            events.push(FeedEvent::Message(TimelineEntry {
                timestamp: ts.to_string(),
                topic,
                data,
            }));
        }
    }

    events
}

/// Strip the `.z` suffix and inflate compressed payloads. Returns `None`
/// when a compressed payload fails to decode.
fn normalize_topic_data(topic: &str, data: &Value) -> Option<(String, Value)> {
    match topic.strip_suffix(".z") {
        Some(plain) => {
            let encoded = data.as_str()?;
            match inflate(encoded) {
                Ok(inflated) => Some((plain.to_string(), inflated)),
                Err(e) => {
                    warn!(topic, error = %e, "dropping undecodable compressed payload");
                    None
                }
            }
        }
        None => Some((topic.to_string(), data.clone())),
    }
}

/// Apply [`normalize_topic_data`] to every topic of the initial reply.
fn normalize_snapshot(reply: &Value) -> Value {
    let Some(map) = reply.as_object() else {
        return reply.clone();
    };

    let mut normalized = serde_json::Map::new();
    for (topic, data) in map {
        if let Some((topic, data)) = normalize_topic_data(topic, data) {
            normalized.insert(topic, data);
        }
    }
    Value::Object(normalized)
}

/// Base64-decode then raw-deflate a compressed topic payload.
fn inflate(encoded: &str) -> Result<Value> {
    let compressed = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| Error::Feed(format!("bad base64: {e}")))?;

    let mut decoder = DeflateDecoder::new(compressed.as_slice());
    let mut inflated = String::new();
    decoder
        .read_to_string(&mut inflated)
        .map_err(|e| Error::Feed(format!("bad deflate stream: {e}")))?;

    Ok(serde_json::from_str(&inflated)?)
}
