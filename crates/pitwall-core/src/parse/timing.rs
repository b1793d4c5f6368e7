//! `TimingData` and `PitLaneTimeCollection` decoders.

use serde_json::Value;

use super::{bool_field, int_field, keyed_entries, string_field, time_value};
use crate::types::PitLaneTime;

/// Partial update for one driver's timing row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingUpdate {
    pub position: Option<u32>,
    pub gap_to_leader: Option<String>,
    pub interval: Option<String>,
    pub last_lap_time: Option<String>,
    pub best_lap_time: Option<String>,
    pub sector1: Option<String>,
    pub sector2: Option<String>,
    pub sector3: Option<String>,
    pub in_pit: Option<bool>,
    pub retired: Option<bool>,
    pub stopped: Option<bool>,
}

/// Decode a `TimingData` payload:
/// `{"Lines": {"1": {"Position": "2", "Sectors": {"0": {"Value": "28.1"}}, ...}}}`.
///
/// `Sectors` arrives index-keyed in diffs and as an array in full payloads;
/// both shapes map onto sectors 1-3. Unmentioned fields stay `None` so the
/// merge preserves prior values.
pub(super) fn parse(data: &Value) -> Vec<(String, TimingUpdate)> {
    let Some(lines) = data.get("Lines") else {
        return Vec::new();
    };

    keyed_entries(lines)
        .into_iter()
        .map(|(number, line)| {
            let mut update = TimingUpdate {
                position: int_field(line, "Position"),
                gap_to_leader: string_field(line, "GapToLeader"),
                interval: line
                    .get("IntervalToPositionAhead")
                    .and_then(|v| string_field(v, "Value").or_else(|| v.as_str().map(String::from))),
                last_lap_time: line.get("LastLapTime").and_then(time_value),
                best_lap_time: line.get("BestLapTime").and_then(time_value),
                sector1: None,
                sector2: None,
                sector3: None,
                in_pit: bool_field(line, "InPit"),
                retired: bool_field(line, "Retired"),
                stopped: bool_field(line, "Stopped"),
            };

            if let Some(sectors) = line.get("Sectors") {
                for (index, sector) in keyed_entries(sectors) {
                    let value = time_value(sector);
                    match index.as_str() {
                        "0" => update.sector1 = value,
                        "1" => update.sector2 = value,
                        "2" => update.sector3 = value,
                        _ => {}
                    }
                }
            }

            (number, update)
        })
        .collect()
}

/// Decode a `PitLaneTimeCollection` payload:
/// `{"PitTimes": {"1": {"Duration": "23.456", "Lap": "12"}}}`.
///
/// Entries without a duration are skipped.
pub(super) fn parse_pit_lane_times(data: &Value) -> Vec<(String, PitLaneTime)> {
    let Some(times) = data.get("PitTimes") else {
        return Vec::new();
    };

    keyed_entries(times)
        .into_iter()
        .filter_map(|(key, entry)| {
            let duration = string_field(entry, "Duration").filter(|d| !d.is_empty())?;
            let number = string_field(entry, "RacingNumber").unwrap_or(key);
            let lap = int_field(entry, "Lap");
            Some((number, PitLaneTime { duration, lap }))
        })
        .collect()
}
