//! `DriverList` decoder.

use serde_json::Value;

use super::{keyed_entries, string_field};

/// Partial update for one driver's identity row. Absent fields preserve
/// whatever the snapshot already holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverUpdate {
    pub racing_number: Option<String>,
    pub abbreviation: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub team_name: Option<String>,
    pub team_color: Option<String>,
    pub country_code: Option<String>,
}

/// Decode a `DriverList` payload:
/// `{"1": {"RacingNumber": "1", "Tla": "VER", "TeamColour": "3671C6", ...}, ...}`.
///
/// Entries carrying neither a racing number nor an abbreviation are skipped;
/// they are line-order bookkeeping the feed sends during reshuffles.
pub(super) fn parse(data: &Value) -> Vec<(String, DriverUpdate)> {
    keyed_entries(data)
        .into_iter()
        .filter_map(|(key, entry)| {
            let update = DriverUpdate {
                racing_number: string_field(entry, "RacingNumber"),
                abbreviation: string_field(entry, "Tla"),
                first_name: string_field(entry, "FirstName"),
                last_name: string_field(entry, "LastName"),
                team_name: string_field(entry, "TeamName"),
                team_color: string_field(entry, "TeamColour").filter(|c| !c.is_empty()),
                country_code: string_field(entry, "CountryCode"),
            };
            if update.racing_number.is_none() && update.abbreviation.is_none() {
                return None;
            }
            let number = update.racing_number.clone().unwrap_or(key);
            Some((number, update))
        })
        .collect()
}
