//! `RaceControlMessages` decoder.

use serde_json::Value;

use super::{int_field, keyed_entries, string_field};
use crate::types::{MessageScope, RaceControlMessage};

/// Decode a `RaceControlMessages` payload:
/// `{"Messages": {"17": {"Utc": ..., "Category": "Flag", "Flag": "YELLOW",
///   "Scope": "Sector", "Sector": 7, "Message": "..."}}}`.
///
/// The highest-keyed entry wins. Returns `None` (preserve prior) when no
/// entry carries a message.
pub(super) fn parse(data: &Value) -> Option<RaceControlMessage> {
    let messages = data.get("Messages")?;

    let (_, entry) = keyed_entries(messages)
        .into_iter()
        .filter_map(|(k, v)| k.parse::<u64>().ok().map(|n| (n, v)))
        .max_by_key(|(n, _)| *n)?;

    let message = string_field(entry, "Message").filter(|m| !m.is_empty())?;

    let scope = string_field(entry, "Scope").and_then(|s| match s.as_str() {
        "Track" => Some(MessageScope::Track),
        "Sector" => Some(MessageScope::Sector),
        "Driver" => Some(MessageScope::Driver),
        _ => None,
    });

    Some(RaceControlMessage {
        utc: string_field(entry, "Utc"),
        message,
        category: string_field(entry, "Category"),
        flag: string_field(entry, "Flag"),
        scope,
        sector: int_field(entry, "Sector"),
        racing_number: string_field(entry, "RacingNumber"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_highest_key_wins() {
        let msg = parse(&json!({
            "Messages": {
                "3": {"Message": "old", "Utc": "2024-01-01T14:00:00Z"},
                "12": {"Message": "TRACK CLEAR", "Category": "Flag", "Flag": "CLEAR",
                        "Scope": "Track", "Utc": "2024-01-01T14:05:00Z"}
            }
        }))
        .unwrap();
        assert_eq!(msg.message, "TRACK CLEAR");
        assert_eq!(msg.scope, Some(MessageScope::Track));
    }

    #[test]
    fn test_array_form_last_wins() {
        let msg = parse(&json!({
            "Messages": [
                {"Message": "first"},
                {"Message": "second"}
            ]
        }))
        .unwrap();
        assert_eq!(msg.message, "second");
    }

    #[test]
    fn test_empty_message_preserves_prior() {
        assert!(parse(&json!({"Messages": {"5": {"Category": "Other"}}})).is_none());
        assert!(parse(&json!({"Messages": {}})).is_none());
        assert!(parse(&json!({})).is_none());
    }

    #[test]
    fn test_driver_scope() {
        let msg = parse(&json!({
            "Messages": {"8": {
                "Message": "CAR 1 TIME DELETED",
                "Scope": "Driver",
                "RacingNumber": "1"
            }}
        }))
        .unwrap();
        assert_eq!(msg.scope, Some(MessageScope::Driver));
        assert_eq!(msg.racing_number.as_deref(), Some("1"));
    }
}
