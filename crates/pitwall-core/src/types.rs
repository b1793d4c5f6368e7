//! Canonical session state model.
//!
//! The [`SessionState`] struct is the single snapshot every component reads:
//! the accumulator folds topic diffs into it, detectors compare two of them,
//! the publisher projects one onto the topic tree. It is a plain owned value;
//! cloning it yields a fully independent copy, which is what the pipeline
//! relies on when handing snapshots to detectors and observers.
//!
//! Field-level optionality matters: an `Option` that is `None` means "never
//! sent", which is distinct from an empty string or zero. Topic diffs are
//! partial merges, so parsers produce update structs whose absent fields
//! leave the stored value untouched.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Global track safety status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    Green,
    Yellow,
    Sc,
    Vsc,
    VscEnding,
    Red,
    Chequered,
}

impl Flag {
    /// Decode an upstream `TrackStatus.Status` code.
    ///
    /// The live feed sends numeric codes; recorded files and the archive
    /// adapter may carry the canonical names instead, so both are accepted.
    /// Unknown codes return `None` and leave the track status unchanged.
    pub fn from_status_code(code: &str) -> Option<Flag> {
        match code {
            "1" | "green" => Some(Flag::Green),
            "2" | "yellow" => Some(Flag::Yellow),
            "4" | "sc" => Some(Flag::Sc),
            "5" | "red" => Some(Flag::Red),
            "6" | "vsc" => Some(Flag::Vsc),
            "7" | "vsc_ending" => Some(Flag::VscEnding),
            "chequered" => Some(Flag::Chequered),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Flag::Green => "green",
            Flag::Yellow => "yellow",
            Flag::Sc => "sc",
            Flag::Vsc => "vsc",
            Flag::VscEnding => "vsc_ending",
            Flag::Red => "red",
            Flag::Chequered => "chequered",
        }
    }

    /// Overtakes are not scored while the field is neutralised.
    pub fn suppresses_overtakes(&self) -> bool {
        matches!(self, Flag::Sc | Flag::Vsc | Flag::VscEnding | Flag::Red)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of session within a race weekend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionType {
    Race,
    Qualifying,
    Practice,
    Sprint,
    SprintQualifying,
}

impl SessionType {
    /// Map the upstream session type string. Unknown values fall back to
    /// `Practice` rather than failing.
    pub fn from_upstream(s: &str) -> SessionType {
        match s {
            "Race" => SessionType::Race,
            "Qualifying" => SessionType::Qualifying,
            "Sprint" => SessionType::Sprint,
            "Sprint Shootout" | "Sprint Qualifying" | "SprintQualifying" => {
                SessionType::SprintQualifying
            }
            _ => SessionType::Practice,
        }
    }
}

/// Tyre compound fitted for a stint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TyreCompound {
    Soft,
    Medium,
    Hard,
    Intermediate,
    Wet,
    Unknown,
}

impl TyreCompound {
    pub fn from_upstream(s: &str) -> TyreCompound {
        match s {
            "SOFT" => TyreCompound::Soft,
            "MEDIUM" => TyreCompound::Medium,
            "HARD" => TyreCompound::Hard,
            "INTERMEDIATE" => TyreCompound::Intermediate,
            "WET" => TyreCompound::Wet,
            _ => TyreCompound::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TyreCompound::Soft => "SOFT",
            TyreCompound::Medium => "MEDIUM",
            TyreCompound::Hard => "HARD",
            TyreCompound::Intermediate => "INTERMEDIATE",
            TyreCompound::Wet => "WET",
            TyreCompound::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for TyreCompound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scope of a race control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageScope {
    Track,
    Sector,
    Driver,
}

/// Session identity as announced by the upstream feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub session_type: SessionType,
    pub circuit: String,
    pub country: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// Upstream session key, used to name the recording directory.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub session_key: Option<i64>,
}

/// Track status plus the optional message that accompanied it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStatus {
    pub flag: Flag,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

impl Default for TrackStatus {
    fn default() -> Self {
        TrackStatus {
            flag: Flag::Green,
            message: None,
        }
    }
}

/// Current and total lap counts. Zero until the first `LapCount` diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapCount {
    pub current: u32,
    pub total: u32,
}

/// Weather conditions. All readings are optional because the upstream feed
/// sends them piecemeal; `rainfall` defaults to dry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Weather {
    pub air_temp: Option<f64>,
    pub track_temp: Option<f64>,
    pub humidity: Option<f64>,
    pub rainfall: bool,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub pressure: Option<f64>,
}

/// A driver's identity row. Identity is the racing number; the remaining
/// fields fill in as `DriverList` diffs arrive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub driver_number: String,
    pub abbreviation: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub team_name: Option<String>,
    /// Six-digit hex, no leading `#`.
    pub team_color: Option<String>,
    pub country_code: Option<String>,
}

/// A driver's live timing row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingLine {
    pub position: Option<u32>,
    pub gap_to_leader: Option<String>,
    pub interval: Option<String>,
    pub last_lap_time: Option<String>,
    pub best_lap_time: Option<String>,
    pub sector1: Option<String>,
    pub sector2: Option<String>,
    pub sector3: Option<String>,
    pub in_pit: bool,
    pub retired: bool,
    pub stopped: bool,
}

/// The stint a driver is currently on. Stint 0 is the starting tyre set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stint {
    pub stint_number: u32,
    pub compound: TyreCompound,
    pub tyre_age: Option<u32>,
    pub new: bool,
}

/// One completed pit lane visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitLaneTime {
    pub duration: String,
    pub lap: Option<u32>,
}

/// One row of the podium provisional classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopThreeEntry {
    pub position: u32,
    pub driver_number: String,
    pub abbreviation: Option<String>,
    pub team_color: Option<String>,
    pub lap_time: Option<String>,
    pub gap_to_leader: Option<String>,
}

/// The most recent race control message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceControlMessage {
    pub utc: Option<String>,
    pub message: String,
    pub category: Option<String>,
    pub flag: Option<String>,
    pub scope: Option<MessageScope>,
    pub sector: Option<u32>,
    pub racing_number: Option<String>,
}

/// The entire observable session at a point in time.
///
/// All driver-keyed maps use the string form of the racing number. The
/// struct derives `Clone` so `StateAccumulator::snapshot` hands out deep,
/// independent copies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionState {
    pub session_info: Option<SessionInfo>,
    pub track_status: TrackStatus,
    pub lap_count: LapCount,
    pub weather: Option<Weather>,
    pub drivers: HashMap<String, Driver>,
    pub timing: HashMap<String, TimingLine>,
    pub stints: HashMap<String, Stint>,
    pub pit_lane_times: HashMap<String, PitLaneTime>,
    pub top_three: Vec<TopThreeEntry>,
    pub latest_race_control_message: Option<RaceControlMessage>,
    /// Timestamp of the last applied message, RFC3339 UTC.
    pub timestamp: Option<String>,
}

impl SessionState {
    /// The driver currently classified first, if any.
    pub fn leader(&self) -> Option<(&str, &TimingLine)> {
        self.timing
            .iter()
            .find(|(_, line)| line.position == Some(1))
            .map(|(number, line)| (number.as_str(), line))
    }

    /// Abbreviation for a driver number, falling back to the number itself.
    pub fn abbreviation_for(&self, driver_number: &str) -> String {
        self.drivers
            .get(driver_number)
            .and_then(|d| d.abbreviation.clone())
            .unwrap_or_else(|| driver_number.to_string())
    }

    /// Team colour for a driver number, if known.
    pub fn team_color_for(&self, driver_number: &str) -> Option<String> {
        self.drivers
            .get(driver_number)
            .and_then(|d| d.team_color.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_status_codes() {
        assert_eq!(Flag::from_status_code("1"), Some(Flag::Green));
        assert_eq!(Flag::from_status_code("2"), Some(Flag::Yellow));
        assert_eq!(Flag::from_status_code("4"), Some(Flag::Sc));
        assert_eq!(Flag::from_status_code("5"), Some(Flag::Red));
        assert_eq!(Flag::from_status_code("6"), Some(Flag::Vsc));
        assert_eq!(Flag::from_status_code("7"), Some(Flag::VscEnding));
        assert_eq!(Flag::from_status_code("99"), None);
        assert_eq!(Flag::from_status_code(""), None);
    }

    #[test]
    fn test_flag_accepts_canonical_names() {
        assert_eq!(Flag::from_status_code("green"), Some(Flag::Green));
        assert_eq!(Flag::from_status_code("vsc_ending"), Some(Flag::VscEnding));
        assert_eq!(Flag::from_status_code("chequered"), Some(Flag::Chequered));
    }

    #[test]
    fn test_flag_serde_names() {
        assert_eq!(serde_json::to_string(&Flag::VscEnding).unwrap(), "\"vsc_ending\"");
        assert_eq!(serde_json::to_string(&Flag::Sc).unwrap(), "\"sc\"");
    }

    #[test]
    fn test_session_type_fallback() {
        assert_eq!(SessionType::from_upstream("Race"), SessionType::Race);
        assert_eq!(
            SessionType::from_upstream("Sprint Shootout"),
            SessionType::SprintQualifying
        );
        assert_eq!(
            SessionType::from_upstream("Shakedown"),
            SessionType::Practice
        );
    }

    #[test]
    fn test_compound_fallback() {
        assert_eq!(TyreCompound::from_upstream("SOFT"), TyreCompound::Soft);
        assert_eq!(TyreCompound::from_upstream("TEST"), TyreCompound::Unknown);
    }

    #[test]
    fn test_default_state() {
        let state = SessionState::default();
        assert_eq!(state.track_status.flag, Flag::Green);
        assert_eq!(state.lap_count, LapCount { current: 0, total: 0 });
        assert!(state.weather.is_none());
        assert!(state.drivers.is_empty());
        assert!(state.leader().is_none());
    }

    #[test]
    fn test_state_roundtrips_through_json() {
        let mut state = SessionState::default();
        state.track_status.flag = Flag::Red;
        state.timing.insert(
            "1".to_string(),
            TimingLine {
                position: Some(1),
                ..Default::default()
            },
        );
        let json = serde_json::to_string(&state).unwrap();
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }

    #[test]
    fn test_leader_lookup() {
        let mut state = SessionState::default();
        state.timing.insert(
            "44".to_string(),
            TimingLine {
                position: Some(2),
                ..Default::default()
            },
        );
        state.timing.insert(
            "1".to_string(),
            TimingLine {
                position: Some(1),
                ..Default::default()
            },
        );
        assert_eq!(state.leader().map(|(n, _)| n), Some("1"));
    }
}
