//! Topic payload decoders.
//!
//! Each upstream topic carries its own JSON shape, and most of them arrive
//! in two forms: a full payload (arrays, complete records) in the initial
//! reply, and sparse diffs (index-keyed objects, subsets of fields) while
//! streaming. The parsers here accept both and reduce them to typed partial
//! updates that the accumulator merges into the snapshot.
//!
//! Parsers never fail: a malformed payload decodes to whatever fields were
//! recognisable, possibly nothing. Error handling is "merge what is present".

mod driver_list;
mod race_control;
mod session;
mod stints;
mod timing;
mod top_three;
mod track_status;
mod weather;

pub use driver_list::DriverUpdate;
pub use timing::TimingUpdate;
pub use top_three::TopThreeUpdate;
pub use weather::WeatherUpdate;

use serde_json::Value;

use crate::types::{LapCount, PitLaneTime, RaceControlMessage, SessionInfo, Stint, TrackStatus};

/// A decoded topic diff, ready for the accumulator to merge.
#[derive(Debug, Clone, PartialEq)]
pub enum TopicUpdate {
    /// Replace the track status (only produced for recognised flag codes).
    TrackStatus(TrackStatus),
    /// Per-driver identity merges, keyed by racing number.
    DriverList(Vec<(String, DriverUpdate)>),
    /// Per-driver timing merges, keyed by racing number.
    Timing(Vec<(String, TimingUpdate)>),
    /// Per-driver current stint replacements, keyed by racing number.
    Stints(Vec<(String, Stint)>),
    /// Replace the session identity.
    SessionInfo(SessionInfo),
    /// Replace the lap count.
    LapCount(LapCount),
    /// Weather field merges.
    Weather(WeatherUpdate),
    /// Per-driver pit lane time merges, keyed by racing number.
    PitLaneTimes(Vec<(String, PitLaneTime)>),
    /// Withheld clears the list; entries replace it.
    TopThree(TopThreeUpdate),
    /// Replace the latest race control message, when one was present.
    RaceControl(Option<RaceControlMessage>),
    /// Topic is not part of the canonical snapshot; only the timestamp moves.
    Unhandled,
}

/// Decode one raw topic payload.
pub fn parse_topic(topic: &str, data: &Value) -> TopicUpdate {
    match topic {
        "TrackStatus" => track_status::parse(data)
            .map(TopicUpdate::TrackStatus)
            .unwrap_or(TopicUpdate::Unhandled),
        "DriverList" => TopicUpdate::DriverList(driver_list::parse(data)),
        "TimingData" => TopicUpdate::Timing(timing::parse(data)),
        "TimingAppData" => TopicUpdate::Stints(stints::parse(data)),
        "SessionInfo" => session::parse_session_info(data)
            .map(TopicUpdate::SessionInfo)
            .unwrap_or(TopicUpdate::Unhandled),
        "LapCount" => session::parse_lap_count(data)
            .map(TopicUpdate::LapCount)
            .unwrap_or(TopicUpdate::Unhandled),
        "WeatherData" => TopicUpdate::Weather(weather::parse(data)),
        "PitLaneTimeCollection" => TopicUpdate::PitLaneTimes(timing::parse_pit_lane_times(data)),
        "TopThree" => top_three::parse(data)
            .map(TopicUpdate::TopThree)
            .unwrap_or(TopicUpdate::Unhandled),
        "RaceControlMessages" => TopicUpdate::RaceControl(race_control::parse(data)),
        _ => TopicUpdate::Unhandled,
    }
}

/// Iterate the entries of a payload that is either an index-keyed object
/// (diff form) or an array (full form). Object keys are yielded as-is;
/// array elements get their position as the key.
pub(crate) fn keyed_entries(value: &Value) -> Vec<(String, &Value)> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter(|(k, _)| !k.starts_with('_'))
            .map(|(k, v)| (k.clone(), v))
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    }
}

/// Read a field as a string, accepting both JSON strings and numbers.
pub(crate) fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read a field as an integer, accepting both numbers and numeric strings.
pub(crate) fn int_field(value: &Value, key: &str) -> Option<u32> {
    match value.get(key)? {
        Value::Number(n) => n.as_u64().map(|n| n as u32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Read a field as a boolean, accepting bools and the strings
/// `"true"`/`"false"` the feed is fond of.
pub(crate) fn bool_field(value: &Value, key: &str) -> Option<bool> {
    match value.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" | "True" => Some(true),
            "false" | "False" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Unwrap a lap/sector time that may be either a bare string or a
/// `{"Value": "..."}` object. Empty strings count as absent.
pub(crate) fn time_value(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("Value").and_then(Value::as_str)?,
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
