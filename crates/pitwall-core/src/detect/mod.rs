//! Pure event detectors.
//!
//! Each detector is a pure function of `(prev, curr)` snapshot pairs: no
//! I/O, no randomness, no state. The aggregator runs them in fixed order
//! (flag, overtake, pit, weather) and concatenates the results, so the same
//! snapshot pair always yields the same event sequence.

mod flag;
mod overtake;
mod pit_stop;
mod weather;

use crate::events::SessionEvent;
use crate::types::SessionState;

/// Run all detectors on a snapshot pair, concatenating in fixed order.
pub fn detect(prev: &SessionState, curr: &SessionState) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    events.extend(flag::detect(prev, curr));
    events.extend(overtake::detect(prev, curr));
    events.extend(pit_stop::detect(prev, curr));
    events.extend(weather::detect(prev, curr));
    events
}
