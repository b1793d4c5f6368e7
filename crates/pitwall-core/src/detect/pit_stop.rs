//! Pit stop detector.

use crate::events::SessionEvent;
use crate::types::SessionState;

/// A completed pit stop shows up as a stint number increment. Stint 0 is
/// the starting tyre set, so a driver first appearing on stint 0 has not
/// stopped; first appearing on a later stint (mid-session join of the feed)
/// counts as one.
pub(super) fn detect(prev: &SessionState, curr: &SessionState) -> Vec<SessionEvent> {
    let mut events: Vec<SessionEvent> = curr
        .stints
        .iter()
        .filter(|(number, stint)| match prev.stints.get(*number) {
            Some(previous) => stint.stint_number > previous.stint_number,
            None => stint.stint_number > 0,
        })
        .map(|(number, stint)| SessionEvent::PitStop {
            driver_number: number.clone(),
            abbreviation: curr.abbreviation_for(number),
            team_color: curr.team_color_for(number),
            new_compound: stint.compound,
            stint_number: stint.stint_number,
        })
        .collect();

    events.sort_by(|a, b| {
        let key = |e: &SessionEvent| match e {
            SessionEvent::PitStop { driver_number, .. } => driver_number.clone(),
            _ => String::new(),
        };
        key(a).cmp(&key(b))
    });
    events
}
