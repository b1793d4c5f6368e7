//! Season constructor colour table.
//!
//! `DriverList` diffs occasionally arrive with a team name but no colour.
//! The accumulator fills the gap from this table so downstream entities
//! always have something to render.

/// `(team name, six-digit hex colour)` for the current season.
const TEAM_COLORS: &[(&str, &str)] = &[
    ("Red Bull Racing", "3671C6"),
    ("Ferrari", "E8002D"),
    ("Mercedes", "27F4D2"),
    ("McLaren", "FF8000"),
    ("Aston Martin", "229971"),
    ("Alpine", "00A1E8"),
    ("Williams", "64C4FF"),
    ("Racing Bulls", "6692FF"),
    ("Kick Sauber", "52E252"),
    ("Haas", "B6BABD"),
];

/// Look up a constructor colour by team name.
///
/// Matching is case-insensitive and tolerant of sponsor prefixes/suffixes
/// ("Oracle Red Bull Racing" matches "Red Bull Racing").
pub fn team_color(team_name: &str) -> Option<&'static str> {
    let needle = team_name.to_ascii_lowercase();
    TEAM_COLORS
        .iter()
        .find(|(name, _)| needle.contains(&name.to_ascii_lowercase()))
        .map(|(_, color)| *color)
}
