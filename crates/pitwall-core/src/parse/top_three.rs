//! `TopThree` decoder.

use serde_json::Value;

use super::{int_field, keyed_entries, string_field, time_value};
use crate::types::TopThreeEntry;

/// Outcome of decoding a `TopThree` payload.
#[derive(Debug, Clone, PartialEq)]
pub enum TopThreeUpdate {
    /// Upstream withheld the classification: clear the list.
    Withheld,
    /// Replace the list with these entries (sorted, at most three).
    Entries(Vec<TopThreeEntry>),
}

/// Decode a `TopThree` payload: `{"Withheld": false, "Lines": [...]}` or the
/// index-keyed diff form. A payload with neither `Withheld: true` nor
/// `Lines` decodes to `None` and leaves the snapshot untouched.
pub(super) fn parse(data: &Value) -> Option<TopThreeUpdate> {
    if data.get("Withheld").and_then(Value::as_bool) == Some(true) {
        return Some(TopThreeUpdate::Withheld);
    }

    let lines = data.get("Lines")?;
    let mut entries: Vec<TopThreeEntry> = keyed_entries(lines)
        .into_iter()
        .filter_map(|(_, line)| {
            Some(TopThreeEntry {
                position: int_field(line, "Position")?,
                driver_number: string_field(line, "RacingNumber")?,
                abbreviation: string_field(line, "Tla"),
                team_color: string_field(line, "TeamColour").filter(|c| !c.is_empty()),
                lap_time: line.get("LapTime").and_then(time_value),
                gap_to_leader: string_field(line, "DiffToLeader"),
            })
        })
        .collect();

    entries.sort_by_key(|e| e.position);
    entries.truncate(3);
    Some(TopThreeUpdate::Entries(entries))
}
