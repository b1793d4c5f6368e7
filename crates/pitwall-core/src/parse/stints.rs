//! `TimingAppData` decoder (tyre stints).

use serde_json::Value;

use super::{bool_field, int_field, keyed_entries, string_field};
use crate::types::{Stint, TyreCompound};

/// Decode a `TimingAppData` payload:
/// `{"Lines": {"1": {"Stints": {"2": {"Compound": "HARD", "New": "true", "TotalLaps": 5}}}}}`.
///
/// A driver's entry may list several stints; only the highest-keyed one is
/// the current stint and becomes the replacement value.
pub(super) fn parse(data: &Value) -> Vec<(String, Stint)> {
    let Some(lines) = data.get("Lines") else {
        return Vec::new();
    };

    keyed_entries(lines)
        .into_iter()
        .filter_map(|(number, line)| {
            let stints = line.get("Stints")?;
            let (stint_key, stint) = keyed_entries(stints)
                .into_iter()
                .filter_map(|(k, v)| k.parse::<u32>().ok().map(|n| (n, v)))
                .max_by_key(|(n, _)| *n)?;

            let compound = string_field(stint, "Compound")
                .map(|c| TyreCompound::from_upstream(&c))
                .unwrap_or(TyreCompound::Unknown);

            Some((
                number,
                Stint {
                    stint_number: stint_key,
                    compound,
                    tyre_age: int_field(stint, "TotalLaps"),
                    new: bool_field(stint, "New").unwrap_or(false),
                },
            ))
        })
        .collect()
}
