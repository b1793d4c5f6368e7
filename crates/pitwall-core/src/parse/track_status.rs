//! `TrackStatus` decoder.

use serde_json::Value;

use super::string_field;
use crate::types::{Flag, TrackStatus};

/// Decode a `TrackStatus` payload: `{"Status": "4", "Message": "SC DEPLOYED"}`.
///
/// Returns `None` for unrecognised status codes so the accumulator leaves
/// the stored status untouched.
pub(super) fn parse(data: &Value) -> Option<TrackStatus> {
    let code = string_field(data, "Status")?;
    let flag = Flag::from_status_code(&code)?;
    let message = string_field(data, "Message").filter(|m| !m.is_empty());
    Some(TrackStatus { flag, message })
}
