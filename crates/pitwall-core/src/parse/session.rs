//! `SessionInfo` and `LapCount` decoders.

use serde_json::Value;

use super::{int_field, string_field};
use crate::types::{LapCount, SessionInfo, SessionType};

/// Decode a `SessionInfo` payload:
/// `{"Meeting": {"Name": ..., "Circuit": {"ShortName": ...}, "Country": {"Name": ...}},
///   "Name": "Race", "Type": "Race", "StartDate": ..., "EndDate": ..., "Key": 9514}`.
pub(super) fn parse_session_info(data: &Value) -> Option<SessionInfo> {
    let name = string_field(data, "Name")
        .or_else(|| data.get("Meeting").and_then(|m| string_field(m, "Name")))?;

    let session_type = string_field(data, "Type")
        .map(|t| SessionType::from_upstream(&t))
        .unwrap_or(SessionType::Practice);

    let meeting = data.get("Meeting");
    let circuit = meeting
        .and_then(|m| m.get("Circuit"))
        .and_then(|c| string_field(c, "ShortName"))
        .unwrap_or_default();
    let country = meeting
        .and_then(|m| m.get("Country"))
        .and_then(|c| string_field(c, "Name"))
        .unwrap_or_default();

    Some(SessionInfo {
        name,
        session_type,
        circuit,
        country,
        start_time: string_field(data, "StartDate"),
        end_time: string_field(data, "EndDate"),
        session_key: data.get("Key").and_then(Value::as_i64),
    })
}

/// Decode a `LapCount` payload, defaulting a missing side to zero. An
/// empty payload decodes to `None` and leaves the count untouched.
pub(super) fn parse_lap_count(data: &Value) -> Option<LapCount> {
    let current = int_field(data, "CurrentLap");
    let total = int_field(data, "TotalLaps");
    if current.is_none() && total.is_none() {
        return None;
    }
    Some(LapCount {
        current: current.unwrap_or(0),
        total: total.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_info() {
        let info = parse_session_info(&json!({
            "Meeting": {
                "Name": "Dutch Grand Prix",
                "Circuit": {"ShortName": "Zandvoort"},
                "Country": {"Name": "Netherlands"}
            },
            "Name": "Race",
            "Type": "Race",
            "StartDate": "2024-08-25T13:00:00",
            "EndDate": "2024-08-25T15:00:00",
            "Key": 9590
        }))
        .unwrap();
        assert_eq!(info.name, "Race");
        assert_eq!(info.session_type, SessionType::Race);
        assert_eq!(info.circuit, "Zandvoort");
        assert_eq!(info.country, "Netherlands");
        assert_eq!(info.session_key, Some(9590));
    }

    #[test]
    fn test_sprint_shootout_maps_to_sprint_qualifying() {
        let info = parse_session_info(&json!({"Name": "Sprint Shootout", "Type": "Sprint Shootout"}))
            .unwrap();
        assert_eq!(info.session_type, SessionType::SprintQualifying);
    }

    #[test]
    fn test_unknown_type_is_practice() {
        let info = parse_session_info(&json!({"Name": "Shakedown", "Type": "Demo"})).unwrap();
        assert_eq!(info.session_type, SessionType::Practice);
    }

    #[test]
    fn test_lap_count_defaults() {
        assert_eq!(
            parse_lap_count(&json!({"CurrentLap": 5})),
            Some(LapCount { current: 5, total: 0 })
        );
        // An empty diff leaves the stored count alone.
        assert_eq!(parse_lap_count(&json!({})), None);
    }
}
