//! Semantic session events produced by the detectors.

use serde::{Deserialize, Serialize};

use crate::types::{Flag, TyreCompound};

/// A semantic event derived from two consecutive snapshots.
///
/// Serialised with a `type` tag so consumers on the bus and the WebSocket
/// fan-out can dispatch without knowing the Rust enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    FlagChange {
        previous_flag: Flag,
        new_flag: Flag,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        message: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Overtake {
        overtaking_driver: String,
        overtaken_driver: String,
        new_position: u32,
        overtaking_abbreviation: String,
        overtaken_abbreviation: String,
        overtaking_team_color: Option<String>,
        overtaken_team_color: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    PitStop {
        driver_number: String,
        abbreviation: String,
        team_color: Option<String>,
        new_compound: TyreCompound,
        stint_number: u32,
    },
    #[serde(rename_all = "camelCase")]
    WeatherChange {
        previous_rainfall: bool,
        new_rainfall: bool,
    },
}

impl SessionEvent {
    /// Suffix of the bus topic this event is published on (`P/event/<suffix>`).
    pub fn topic_suffix(&self) -> &'static str {
        match self {
            SessionEvent::FlagChange { .. } => "flag",
            SessionEvent::Overtake { .. } => "overtake",
            SessionEvent::PitStop { .. } => "pit_stop",
            SessionEvent::WeatherChange { .. } => "weather",
        }
    }
}
