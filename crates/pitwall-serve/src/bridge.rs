//! Live wiring between the feed, the pipeline, the recorder and the bus.
//!
//! The daemon binary spawns three loops from here:
//!
//! - the **live loop**: consumes feed events, owns the live pipeline and
//!   recorder, begins/ends the session entity lifecycle
//! - the **playback fan-out**: mirrors controller output onto the bus
//! - the **command loop**: maps bus playback commands onto the controller
//!
//! Each loop is a single-writer domain: the live pipeline is only touched
//! here, the controller has its own pipeline, and the publisher's entity
//! set is only mutated from the live loop and shutdown.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

use pitwall_core::{Pipeline, SessionState, StateAccumulator};
use pitwall_ingest::{FeedClient, FeedConfig, FeedEvent, PlaybackController, PlaybackEvent, Recorder, RecordingMeta};
use pitwall_publish::{InboundMessage, MqttClient, Publisher};

use crate::state::Config;

/// A playback command received from the bus or REST surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Stop,
    Speed(f64),
    Seek(String),
}

/// Parse a command payload: either a bare command string (`play`) or a
/// JSON object (`{"command": "seek", "value": "2024-..."}`).
pub fn parse_command(payload: &str) -> Option<Command> {
    let (command, value) = match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => {
            let command = map.get("command")?.as_str()?.to_string();
            (command, map.get("value").cloned())
        }
        Ok(Value::String(s)) => (s, None),
        _ => (payload.trim().to_string(), None),
    };

    match command.as_str() {
        "play" => Some(Command::Play),
        "pause" => Some(Command::Pause),
        "stop" => Some(Command::Stop),
        "speed" => {
            let speed = match value? {
                Value::Number(n) => n.as_f64()?,
                Value::String(s) => s.parse().ok()?,
                _ => return None,
            };
            Some(Command::Speed(speed))
        }
        "seek" => Some(Command::Seek(value?.as_str()?.to_string())),
        _ => None,
    }
}

fn apply_command(controller: &PlaybackController, command: Command) {
    match command {
        Command::Play => controller.play(),
        Command::Pause => controller.pause(),
        Command::Stop => controller.stop(),
        Command::Speed(speed) => controller.set_speed(speed),
        Command::Seek(target) => controller.seek(&target),
    }
}

/// Fold the hub's initial per-topic reply into a session snapshot.
pub fn initial_state_from_snapshot(snapshot: &Value) -> SessionState {
    let mut accumulator = StateAccumulator::new();
    if let Some(map) = snapshot.as_object() {
        for (topic, data) in map {
            accumulator.apply(topic, data, None);
        }
    }
    accumulator.snapshot()
}

/// Does this message mark the end of the session? The feed announces it on
/// `SessionData` as a status series entry of `Finalised`.
pub fn session_finished(topic: &str, data: &Value) -> bool {
    if topic != "SessionData" {
        return false;
    }
    let series = data
        .get("StatusSeries")
        .map(|s| s.to_string())
        .unwrap_or_default();
    series.contains("Finalised")
}

/// Derive recording metadata from the session snapshot. Sessions without
/// an upstream key are not recorded.
pub fn meta_from_state(state: &SessionState) -> Option<RecordingMeta> {
    let info = state.session_info.as_ref()?;
    let session_key = info.session_key?;
    let start_time = info.start_time.clone().unwrap_or_default();
    let year = start_time
        .get(..4)
        .and_then(|y| y.parse().ok())
        .unwrap_or(0);

    Some(RecordingMeta {
        session_key,
        year,
        session_name: info.name.clone(),
        session_type: format!("{:?}", info.session_type),
        circuit: info.circuit.clone(),
        start_time,
        end_time: None,
    })
}

struct LiveSession {
    pipeline: Pipeline,
    recorder: Option<Recorder>,
}

/// Spawn the live feed loop. Returns the feed client handle so shutdown
/// can stop the reconnect loop.
pub fn spawn_live(
    config: Arc<Config>,
    publisher: Arc<Mutex<Publisher>>,
    mqtt: MqttClient,
) -> Arc<FeedClient> {
    let client = Arc::new(FeedClient::new(FeedConfig::default()));
    let (tx, rx) = mpsc::channel(256);

    let runner = Arc::clone(&client);
    tokio::spawn(async move {
        runner.run(tx).await;
    });
    tokio::spawn(live_loop(config, publisher, mqtt, rx));

    client
}

async fn live_loop(
    config: Arc<Config>,
    publisher: Arc<Mutex<Publisher>>,
    mqtt: MqttClient,
    mut rx: mpsc::Receiver<FeedEvent>,
) {
    let mut session: Option<LiveSession> = None;

    while let Some(event) = rx.recv().await {
        match event {
            FeedEvent::Connected => {}
            FeedEvent::InitialState(snapshot) => {
                let state = initial_state_from_snapshot(&snapshot);

                let recorder = meta_from_state(&state).and_then(|meta| {
                    match Recorder::start(&config.recordings_dir, meta, &state) {
                        Ok(recorder) => Some(recorder),
                        Err(e) => {
                            warn!(error = %e, "recording disabled for this session");
                            None
                        }
                    }
                });

                let (register, initial_messages) = {
                    let mut publisher = publisher.lock();
                    let register = if publisher.session_active() {
                        // Reconnect mid-session: entities already exist.
                        Vec::new()
                    } else {
                        publisher.register_session_entities()
                    };
                    (register, publisher.state_messages(&state))
                };
                let _ = mqtt.publish_all(&register).await;
                let _ = mqtt.publish_all(&initial_messages).await;

                info!(
                    session = state
                        .session_info
                        .as_ref()
                        .map(|i| i.name.as_str())
                        .unwrap_or("unknown"),
                    "live session started"
                );
                session = Some(LiveSession {
                    pipeline: Pipeline::with_initial(&state),
                    recorder,
                });
            }
            FeedEvent::Message(entry) => {
                if session_finished(&entry.topic, &entry.data) {
                    if let Some(mut live) = session.take() {
                        if let Some(recorder) = live.recorder.as_mut() {
                            recorder.finish(&entry.timestamp);
                            recorder.stop();
                        }
                        let messages = publisher.lock().deregister_session_entities();
                        let _ = mqtt.publish_all(&messages).await;
                        info!("live session finished");
                    }
                    continue;
                }

                let Some(live) = session.as_mut() else {
                    continue;
                };
                if let Some(recorder) = live.recorder.as_mut() {
                    recorder.write(&entry);
                }

                let update = live.pipeline.process(&entry);
                let (event_messages, state_messages) = {
                    let publisher = publisher.lock();
                    (
                        publisher.event_messages(&update.events),
                        publisher.state_messages(&update.snapshot),
                    )
                };
                // Events precede the aggregate state, matching the
                // pipeline's observer ordering.
                let _ = mqtt.publish_all(&event_messages).await;
                let _ = mqtt.publish_all(&state_messages).await;
            }
            FeedEvent::Disconnected => {
                // The recorder and entity set survive a reconnect; the
                // bridge's own status topic already reflects the outage.
            }
        }
    }
}

/// Mirror playback controller output onto the bus.
pub fn spawn_playback_fanout(
    controller: PlaybackController,
    publisher: Arc<Mutex<Publisher>>,
    mqtt: MqttClient,
) {
    let mut events = controller.subscribe();

    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    // The bus must see every update; lagging here means the
                    // broker write path is badly stuck.
                    warn!(skipped, "playback fan-out lagged");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            };

            let messages = {
                let publisher = publisher.lock();
                match &event {
                    PlaybackEvent::Update {
                        snapshot,
                        events,
                        playback,
                        ..
                    } => {
                        let mut messages = publisher.event_messages(events);
                        messages.extend(publisher.state_messages(snapshot));
                        if let Ok(info) = serde_json::to_value(playback) {
                            messages.push(publisher.playback_state_message(&info));
                        }
                        messages
                    }
                    PlaybackEvent::Loaded { playback }
                    | PlaybackEvent::StateChange { playback }
                    | PlaybackEvent::Seek { playback, .. } => {
                        match serde_json::to_value(playback) {
                            Ok(info) => vec![publisher.playback_state_message(&info)],
                            Err(_) => Vec::new(),
                        }
                    }
                    // Per-event emissions are already covered by the
                    // owning update; Finished state lands via StateChange.
                    PlaybackEvent::Event { .. } | PlaybackEvent::Finished => Vec::new(),
                }
            };
            let _ = mqtt.publish_all(&messages).await;
        }
    });
}

/// Map inbound bus messages on the command topic onto the controller.
pub fn spawn_command_loop(
    mut inbound: mpsc::Receiver<InboundMessage>,
    controller: PlaybackController,
    command_topic: String,
) {
    tokio::spawn(async move {
        while let Some(message) = inbound.recv().await {
            if message.topic != command_topic {
                continue;
            }
            match parse_command(&message.payload) {
                Some(command) => {
                    info!(?command, "bus playback command");
                    apply_command(&controller, command);
                }
                None => warn!(payload = %message.payload, "unrecognised playback command"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitwall_core::Flag;
    use serde_json::json;

    #[test]
    fn test_parse_command_forms() {
        assert_eq!(parse_command("play"), Some(Command::Play));
        assert_eq!(parse_command(r#""pause""#), Some(Command::Pause));
        assert_eq!(
            parse_command(r#"{"command": "speed", "value": 2.5}"#),
            Some(Command::Speed(2.5))
        );
        assert_eq!(
            parse_command(r#"{"command": "speed", "value": "4"}"#),
            Some(Command::Speed(4.0))
        );
        assert_eq!(
            parse_command(r#"{"command": "seek", "value": "2024-08-25T13:00:00Z"}"#),
            Some(Command::Seek("2024-08-25T13:00:00Z".to_string()))
        );
        assert_eq!(parse_command("launch"), None);
        assert_eq!(parse_command(r#"{"command": "seek"}"#), None);
    }

    #[test]
    fn test_initial_state_from_snapshot() {
        let snapshot = json!({
            "TrackStatus": {"Status": "2", "Message": "YELLOW"},
            "LapCount": {"CurrentLap": 3, "TotalLaps": 57},
            "DriverList": {"1": {"RacingNumber": "1", "Tla": "VER"}},
            "CarData": {"Entries": []}
        });
        let state = initial_state_from_snapshot(&snapshot);
        assert_eq!(state.track_status.flag, Flag::Yellow);
        assert_eq!(state.lap_count.total, 57);
        assert_eq!(state.drivers["1"].abbreviation.as_deref(), Some("VER"));
    }

    #[test]
    fn test_session_finished() {
        let data = json!({"StatusSeries": {"5": {"SessionStatus": "Finalised"}}});
        assert!(session_finished("SessionData", &data));
        assert!(!session_finished("SessionData", &json!({"StatusSeries": {}})));
        assert!(!session_finished("TrackStatus", &data));
    }

    #[test]
    fn test_meta_from_state() {
        let snapshot = json!({
            "SessionInfo": {
                "Meeting": {
                    "Name": "Dutch Grand Prix",
                    "Circuit": {"ShortName": "Zandvoort"},
                    "Country": {"Name": "Netherlands"}
                },
                "Name": "Race",
                "Type": "Race",
                "StartDate": "2024-08-25T15:00:00",
                "Key": 9590
            }
        });
        let state = initial_state_from_snapshot(&snapshot);
        let meta = meta_from_state(&state).unwrap();
        assert_eq!(meta.session_key, 9590);
        assert_eq!(meta.year, 2024);
        assert_eq!(meta.circuit, "Zandvoort");

        assert!(meta_from_state(&SessionState::default()).is_none());
    }
}
