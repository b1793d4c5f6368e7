//! Flag transition detector.

use crate::events::SessionEvent;
use crate::types::SessionState;

/// Emit one `flag_change` when the flag value differs between snapshots.
/// The message comes from the current snapshot only.
pub(super) fn detect(prev: &SessionState, curr: &SessionState) -> Vec<SessionEvent> {
    if prev.track_status.flag == curr.track_status.flag {
        return Vec::new();
    }

    vec![SessionEvent::FlagChange {
        previous_flag: prev.track_status.flag,
        new_flag: curr.track_status.flag,
        message: curr.track_status.message.clone(),
    }]
}
