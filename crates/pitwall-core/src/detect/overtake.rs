//! Overtake detector.

use crate::events::SessionEvent;
use crate::types::SessionState;

/// For each driver whose position strictly improved, find every driver they
/// passed on track.
///
/// Position changes are not scored while the overtaking driver is in the
/// pit lane, or while the field is neutralised (safety car, VSC, red flag):
/// those shuffles are pit cycles and queue reordering, not passes.
///
/// The "was passed" predicate: O was ahead of D before (`prevO < prevD`),
/// is behind D now (`currO > currD`), and D's new position reaches at least
/// O's old slot (`prevO >= currD`). The bound intentionally permits
/// equality. Pitting and retired drivers are not counted as passed.
pub(super) fn detect(prev: &SessionState, curr: &SessionState) -> Vec<SessionEvent> {
    if curr.track_status.flag.suppresses_overtakes() {
        return Vec::new();
    }

    let mut events = Vec::new();

    for (number, curr_line) in &curr.timing {
        let Some(curr_pos) = curr_line.position else {
            continue;
        };
        let Some(prev_line) = prev.timing.get(number) else {
            continue;
        };
        let Some(prev_pos) = prev_line.position else {
            continue;
        };
        if curr_pos >= prev_pos || curr_line.in_pit {
            continue;
        }

        for (other, other_prev) in &prev.timing {
            if other == number {
                continue;
            }
            let Some(other_prev_pos) = other_prev.position else {
                continue;
            };
            let Some(other_curr) = curr.timing.get(other) else {
                continue;
            };
            let Some(other_curr_pos) = other_curr.position else {
                continue;
            };

            let passed = other_prev_pos < prev_pos
                && other_curr_pos > curr_pos
                && other_prev_pos >= curr_pos;
            if !passed {
                continue;
            }
            if other_prev.in_pit || other_curr.in_pit || other_curr.retired {
                continue;
            }

            events.push(SessionEvent::Overtake {
                overtaking_driver: number.clone(),
                overtaken_driver: other.clone(),
                new_position: curr_pos,
                overtaking_abbreviation: curr.abbreviation_for(number),
                overtaken_abbreviation: curr.abbreviation_for(other),
                overtaking_team_color: curr.team_color_for(number),
                overtaken_team_color: curr.team_color_for(other),
            });
        }
    }

    // Map iteration order is arbitrary; sort for a deterministic sequence.
    events.sort_by(|a, b| {
        let key = |e: &SessionEvent| match e {
            SessionEvent::Overtake {
                overtaking_driver,
                overtaken_driver,
                ..
            } => (overtaking_driver.clone(), overtaken_driver.clone()),
            _ => (String::new(), String::new()),
        };
        key(a).cmp(&key(b))
    });
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Driver, Flag, TimingLine};

    fn line(pos: u32) -> TimingLine {
        TimingLine {
            position: Some(pos),
            ..Default::default()
        }
    }

    fn grid(entries: &[(&str, TimingLine)]) -> SessionState {
        let mut state = SessionState::default();
        for (number, timing) in entries {
            state.timing.insert(number.to_string(), timing.clone());
            state.drivers.insert(
                number.to_string(),
                Driver {
                    driver_number: number.to_string(),
                    ..Default::default()
                },
            );
        }
        state
    }

    #[test]
    fn test_simple_swap_under_green() {
        let prev = grid(&[("1", line(1)), ("4", line(2))]);
        let curr = grid(&[("1", line(2)), ("4", line(1))]);

        let events = detect(&prev, &curr);
        assert_eq!(events.len(), 1);
        match &events[0] {
            SessionEvent::Overtake {
                overtaking_driver,
                overtaken_driver,
                new_position,
                ..
            } => {
                assert_eq!(overtaking_driver, "4");
                assert_eq!(overtaken_driver, "1");
                assert_eq!(*new_position, 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_suppressed_under_neutralisation() {
        let prev = grid(&[("1", line(1)), ("4", line(2))]);
        for flag in [Flag::Sc, Flag::Vsc, Flag::VscEnding, Flag::Red] {
            let mut curr = grid(&[("1", line(2)), ("4", line(1))]);
            curr.track_status.flag = flag;
            assert!(detect(&prev, &curr).is_empty(), "flag {flag}");
        }
    }

    #[test]
    fn test_pitting_overtaker_ignored() {
        let prev = grid(&[("1", line(1)), ("4", line(2))]);
        let mut curr = grid(&[("1", line(2)), ("4", line(1))]);
        curr.timing.get_mut("4").unwrap().in_pit = true;
        assert!(detect(&prev, &curr).is_empty());
    }

    #[test]
    fn test_pitting_or_retired_victim_ignored() {
        let prev = grid(&[("1", line(1)), ("4", line(2))]);
        let mut curr = grid(&[("1", line(2)), ("4", line(1))]);
        curr.timing.get_mut("1").unwrap().in_pit = true;
        assert!(detect(&prev, &curr).is_empty());

        let mut curr = grid(&[("1", line(2)), ("4", line(1))]);
        curr.timing.get_mut("1").unwrap().retired = true;
        assert!(detect(&prev, &curr).is_empty());
    }

    #[test]
    fn test_multi_place_gain_emits_per_victim() {
        let prev = grid(&[("1", line(1)), ("4", line(2)), ("16", line(3))]);
        let curr = grid(&[("1", line(2)), ("4", line(3)), ("16", line(1))]);

        let events = detect(&prev, &curr);
        assert_eq!(events.len(), 2);
        // Sorted by (overtaking, overtaken): 16 passed both 1 and 4.
        for event in &events {
            match event {
                SessionEvent::Overtake {
                    overtaking_driver, ..
                } => assert_eq!(overtaking_driver, "16"),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn test_driver_new_to_grid_no_event() {
        let prev = grid(&[("1", line(1))]);
        let curr = grid(&[("1", line(2)), ("4", line(1))]);
        assert!(detect(&prev, &curr).is_empty());
    }

    #[test]
    fn test_abbreviations_resolved_from_current_snapshot() {
        let prev = grid(&[("1", line(1)), ("4", line(2))]);
        let mut curr = grid(&[("1", line(2)), ("4", line(1))]);
        curr.drivers.get_mut("4").unwrap().abbreviation = Some("NOR".to_string());
        curr.drivers.get_mut("4").unwrap().team_color = Some("FF8000".to_string());

        match &detect(&prev, &curr)[0] {
            SessionEvent::Overtake {
                overtaking_abbreviation,
                overtaking_team_color,
                overtaken_abbreviation,
                ..
            } => {
                assert_eq!(overtaking_abbreviation, "NOR");
                assert_eq!(overtaking_team_color.as_deref(), Some("FF8000"));
                // Unknown abbreviation falls back to the racing number.
                assert_eq!(overtaken_abbreviation, "1");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
