//! Snapshot and event projection onto the bus topic tree.
//!
//! Topic layout under the configurable prefix `P` (default `f12mqtt`):
//!
//! ```text
//! P/status                      online | offline (retained, LWT offline)
//! P/session/status              active | finished (retained)
//! P/session/{info,flag,leader,lap,weather,race_control}   (retained)
//! P/driver/<n>/{position,gap,tyre,status}                 (retained)
//! P/event/{flag,overtake,pit_stop,weather}                (NOT retained)
//! P/standings/{last_winner,drivers_leader,constructors_leader}  (retained)
//! P/schedule/next_race                                    (retained)
//! P/playback/{state,command}
//! ```
//!
//! The publisher is pure: every method builds [`BusMessage`] batches, and
//! the transport layer ships them. That keeps the projection rules fully
//! unit-testable without a broker.

use serde_json::json;
use tracing::debug;

use pitwall_core::{SessionEvent, SessionState};

use crate::discovery::{removal_message, EntityDef};
use crate::notifier::NotifierConfig;

/// One message bound for the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: String,
    pub retained: bool,
}

/// Season-long entities with values fed from outside the session pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandingsKind {
    LastWinner,
    DriversLeader,
    ConstructorsLeader,
}

impl StandingsKind {
    fn suffix(&self) -> &'static str {
        match self {
            StandingsKind::LastWinner => "standings/last_winner",
            StandingsKind::DriversLeader => "standings/drivers_leader",
            StandingsKind::ConstructorsLeader => "standings/constructors_leader",
        }
    }
}

/// Publisher settings.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Topic prefix `P`.
    pub prefix: String,
    /// Auto-discovery prefix of the home-automation platform.
    pub discovery_prefix: String,
    /// Racing numbers that get per-driver entities.
    pub favourite_drivers: Vec<String>,
    /// Notifier device, when enabled.
    pub notifier: Option<NotifierConfig>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        PublisherConfig {
            prefix: "f12mqtt".to_string(),
            discovery_prefix: "homeassistant".to_string(),
            favourite_drivers: Vec::new(),
            notifier: None,
        }
    }
}

/// Projects pipeline output onto the topic tree and manages the entity
/// lifecycle. Holds the set of session-scoped discovery topics between
/// register and deregister.
pub struct Publisher {
    config: PublisherConfig,
    session_active: bool,
    ephemeral_topics: Vec<String>,
}

impl Publisher {
    pub fn new(config: PublisherConfig) -> Self {
        Publisher {
            config,
            session_active: false,
            ephemeral_topics: Vec::new(),
        }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Whether state publication is enabled (between register and
    /// deregister).
    pub fn session_active(&self) -> bool {
        self.session_active
    }

    fn topic(&self, suffix: &str) -> String {
        format!("{}/{}", self.config.prefix, suffix)
    }

    fn retained(&self, suffix: &str, payload: impl Into<String>) -> BusMessage {
        BusMessage {
            topic: self.topic(suffix),
            payload: payload.into(),
            retained: true,
        }
    }

    /// Topic carrying playback commands from the bus.
    pub fn command_topic(&self) -> String {
        self.topic("playback/command")
    }

    /// Retained playback state message.
    pub fn playback_state_message(&self, state: &serde_json::Value) -> BusMessage {
        self.retained("playback/state", state.to_string())
    }

    /// Retained standings value message.
    pub fn standings_message(&self, kind: StandingsKind, value: &str) -> BusMessage {
        self.retained(kind.suffix(), value)
    }

    /// Retained next-race schedule message.
    pub fn next_race_message(&self, value: &serde_json::Value) -> BusMessage {
        self.retained("schedule/next_race", value.to_string())
    }

    /// Discovery configs for entities that outlive sessions. Published
    /// once at startup.
    pub fn register_persistent_entities(&self) -> Vec<BusMessage> {
        self.persistent_entities()
            .iter()
            .map(|e| e.config_message(&self.config.discovery_prefix))
            .collect()
    }

    fn persistent_entities(&self) -> Vec<EntityDef> {
        let id = |suffix: &str| format!("{}_{}", self.config.prefix, suffix);
        vec![
            EntityDef::new(id("status"), "Bridge status", self.topic("status"))
                .icon("mdi:connection"),
            EntityDef::new(
                id("last_winner"),
                "Last race winner",
                self.topic("standings/last_winner"),
            )
            .icon("mdi:trophy"),
            EntityDef::new(
                id("drivers_leader"),
                "Drivers championship leader",
                self.topic("standings/drivers_leader"),
            )
            .icon("mdi:racing-helmet"),
            EntityDef::new(
                id("constructors_leader"),
                "Constructors championship leader",
                self.topic("standings/constructors_leader"),
            )
            .icon("mdi:factory"),
            EntityDef::new(
                id("next_race"),
                "Next race",
                self.topic("schedule/next_race"),
            )
            .icon("mdi:calendar"),
        ]
    }

    /// Register session-scoped entities and enable state publication.
    /// Returns the discovery configs plus the `session/status = active`
    /// marker.
    pub fn register_session_entities(&mut self) -> Vec<BusMessage> {
        let entities = self.session_entities();
        self.ephemeral_topics = entities
            .iter()
            .map(|e| e.config_topic(&self.config.discovery_prefix))
            .collect();

        let mut messages: Vec<BusMessage> = entities
            .iter()
            .map(|e| e.config_message(&self.config.discovery_prefix))
            .collect();
        messages.push(self.retained("session/status", "active"));

        self.session_active = true;
        debug!(entities = entities.len(), "session entities registered");
        messages
    }

    fn session_entities(&self) -> Vec<EntityDef> {
        let id = |suffix: &str| format!("{}_{}", self.config.prefix, suffix);
        let mut entities = vec![
            EntityDef::new(id("session_info"), "Session", self.topic("session/info"))
                .icon("mdi:information"),
            EntityDef::new(id("session_flag"), "Track flag", self.topic("session/flag"))
                .icon("mdi:flag"),
            EntityDef::new(id("session_leader"), "Leader", self.topic("session/leader"))
                .icon("mdi:trophy-outline"),
            EntityDef::new(id("session_lap"), "Lap", self.topic("session/lap"))
                .icon("mdi:counter"),
            EntityDef::new(id("session_weather"), "Weather", self.topic("session/weather"))
                .icon("mdi:weather-partly-cloudy"),
            EntityDef::new(
                id("race_control"),
                "Race control",
                self.topic("session/race_control"),
            )
            .icon("mdi:bullhorn"),
            EntityDef::new(id("playback"), "Playback", self.topic("playback/state"))
                .icon("mdi:play-pause"),
        ];

        for number in &self.config.favourite_drivers {
            let base = format!("driver/{number}");
            entities.push(
                EntityDef::new(
                    id(&format!("driver_{number}_position")),
                    format!("Driver {number} position"),
                    self.topic(&format!("{base}/position")),
                )
                .icon("mdi:numeric"),
            );
            entities.push(
                EntityDef::new(
                    id(&format!("driver_{number}_gap")),
                    format!("Driver {number} gap"),
                    self.topic(&format!("{base}/gap")),
                )
                .icon("mdi:timer-outline"),
            );
            entities.push(
                EntityDef::new(
                    id(&format!("driver_{number}_tyre")),
                    format!("Driver {number} tyre"),
                    self.topic(&format!("{base}/tyre")),
                )
                .icon("mdi:tire"),
            );
        }

        entities
    }

    /// Remove every session entity (empty retained payloads on the
    /// remembered config topics), mark the session finished and disable
    /// state publication.
    pub fn deregister_session_entities(&mut self) -> Vec<BusMessage> {
        let mut messages: Vec<BusMessage> = self
            .ephemeral_topics
            .drain(..)
            .map(|topic| removal_message(&topic))
            .collect();
        messages.push(self.retained("session/status", "finished"));
        self.session_active = false;
        debug!(removed = messages.len() - 1, "session entities deregistered");
        messages
    }

    /// Project one snapshot onto the state topics. Short-circuits to
    /// nothing while no session is active.
    pub fn state_messages(&self, state: &SessionState) -> Vec<BusMessage> {
        if !self.session_active {
            return Vec::new();
        }

        let mut messages = Vec::new();

        messages.push(self.retained("session/flag", state.track_status.flag.as_str()));

        if state.lap_count.total > 0 {
            messages.push(self.retained(
                "session/lap",
                json!({
                    "current": state.lap_count.current,
                    "total": state.lap_count.total,
                })
                .to_string(),
            ));
        }

        if let Some(weather) = &state.weather {
            messages.push(self.retained(
                "session/weather",
                serde_json::to_string(weather).unwrap_or_default(),
            ));
        }

        if let Some(info) = &state.session_info {
            messages.push(self.retained(
                "session/info",
                serde_json::to_string(info).unwrap_or_default(),
            ));
        }

        if let Some(message) = &state.latest_race_control_message {
            messages.push(self.retained(
                "session/race_control",
                serde_json::to_string(message).unwrap_or_default(),
            ));
        }

        if let Some((number, _)) = state.leader() {
            messages.push(self.retained(
                "session/leader",
                json!({
                    "driverNumber": number,
                    "abbreviation": state.abbreviation_for(number),
                    "teamColor": state.team_color_for(number),
                })
                .to_string(),
            ));
        }

        for number in &self.config.favourite_drivers {
            messages.extend(self.driver_messages(state, number));
        }

        if let Some(notifier) = &self.config.notifier {
            messages.extend(notifier.app_messages(state, &self.config.favourite_drivers));
        }

        messages
    }

    fn driver_messages(&self, state: &SessionState, number: &str) -> Vec<BusMessage> {
        let Some(line) = state.timing.get(number) else {
            return Vec::new();
        };

        let mut messages = Vec::new();
        let base = format!("driver/{number}");

        if let Some(position) = line.position {
            messages.push(self.retained(&format!("{base}/position"), position.to_string()));

            let gap = if position == 1 {
                "LEADER".to_string()
            } else {
                line.gap_to_leader.clone().unwrap_or_default()
            };
            messages.push(self.retained(&format!("{base}/gap"), gap));
        }

        if let Some(stint) = state.stints.get(number) {
            messages.push(self.retained(&format!("{base}/tyre"), stint.compound.as_str()));
        }

        let status = if line.retired {
            "retired"
        } else if line.in_pit {
            "pit"
        } else {
            "racing"
        };
        messages.push(self.retained(&format!("{base}/status"), status));

        messages
    }

    /// Project detected events onto the non-retained event topics, plus
    /// notifier notifications when enabled.
    pub fn event_messages(&self, events: &[SessionEvent]) -> Vec<BusMessage> {
        let mut messages = Vec::new();

        for event in events {
            messages.push(BusMessage {
                topic: self.topic(&format!("event/{}", event.topic_suffix())),
                payload: serde_json::to_string(event).unwrap_or_default(),
                retained: false,
            });
            if let Some(notifier) = &self.config.notifier {
                messages.push(notifier.event_notification(event));
            }
        }

        messages
    }
}
