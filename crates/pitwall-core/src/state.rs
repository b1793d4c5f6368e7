//! State accumulator: folds topic diffs into the session snapshot.
//!
//! The accumulator owns one [`SessionState`] and merges decoded diffs into
//! it. Merges are partial at the leaf level: an absent field preserves the
//! prior value, recursively for nested records. Unknown topics and
//! malformed payloads update nothing but the timestamp.
//!
//! Exactly one driver (the live pipeline or a playback controller) applies
//! diffs to a given accumulator; readers take owned copies via
//! [`StateAccumulator::snapshot`].

use serde_json::Value;

use crate::parse::{self, DriverUpdate, TimingUpdate, TopThreeUpdate, TopicUpdate, WeatherUpdate};
use crate::teams;
use crate::types::{Driver, SessionState, Weather};

/// Folds the stream of raw topic diffs into a canonical snapshot.
#[derive(Debug, Default)]
pub struct StateAccumulator {
    state: SessionState,
}

impl StateAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the accumulator with an initial snapshot (deep copy taken).
    pub fn with_initial(initial: &SessionState) -> Self {
        StateAccumulator {
            state: initial.clone(),
        }
    }

    /// Current snapshot by read-only reference.
    pub fn get(&self) -> &SessionState {
        &self.state
    }

    /// Deep, fully independent copy of the current snapshot.
    pub fn snapshot(&self) -> SessionState {
        self.state.clone()
    }

    /// Re-initialise to defaults.
    pub fn reset(&mut self) {
        self.state = SessionState::default();
    }

    /// Reset to a copy of the given snapshot.
    pub fn reset_to(&mut self, initial: &SessionState) {
        self.state = initial.clone();
    }

    /// Merge one raw topic diff. Never fails: unknown topics and malformed
    /// payloads only move the timestamp forward.
    pub fn apply(&mut self, topic: &str, data: &Value, timestamp: Option<&str>) {
        if let Some(ts) = timestamp {
            self.state.timestamp = Some(ts.to_string());
        }

        match parse::parse_topic(topic, data) {
            TopicUpdate::TrackStatus(status) => {
                self.state.track_status = status;
            }
            TopicUpdate::DriverList(updates) => {
                for (number, update) in updates {
                    self.merge_driver(number, update);
                }
            }
            TopicUpdate::Timing(updates) => {
                for (number, update) in updates {
                    self.merge_timing(number, update);
                }
            }
            TopicUpdate::Stints(stints) => {
                for (number, stint) in stints {
                    self.state.stints.insert(number, stint);
                }
            }
            TopicUpdate::SessionInfo(info) => {
                self.state.session_info = Some(info);
            }
            TopicUpdate::LapCount(laps) => {
                self.state.lap_count = laps;
            }
            TopicUpdate::Weather(update) => {
                self.merge_weather(update);
            }
            TopicUpdate::PitLaneTimes(times) => {
                for (number, time) in times {
                    self.state.pit_lane_times.insert(number, time);
                }
            }
            TopicUpdate::TopThree(TopThreeUpdate::Withheld) => {
                self.state.top_three.clear();
            }
            TopicUpdate::TopThree(TopThreeUpdate::Entries(entries)) => {
                self.state.top_three = entries;
            }
            TopicUpdate::RaceControl(Some(message)) => {
                self.state.latest_race_control_message = Some(message);
            }
            TopicUpdate::RaceControl(None) | TopicUpdate::Unhandled => {}
        }
    }

    fn merge_driver(&mut self, number: String, update: DriverUpdate) {
        let driver = self
            .state
            .drivers
            .entry(number.clone())
            .or_insert_with(|| Driver {
                driver_number: number,
                ..Default::default()
            });

        merge_opt(&mut driver.abbreviation, update.abbreviation);
        merge_opt(&mut driver.first_name, update.first_name);
        merge_opt(&mut driver.last_name, update.last_name);
        merge_opt(&mut driver.team_name, update.team_name);
        merge_opt(&mut driver.team_color, update.team_color);
        merge_opt(&mut driver.country_code, update.country_code);

        // Colour missing but team known: fill from the season table.
        if driver.team_color.is_none() {
            if let Some(name) = &driver.team_name {
                driver.team_color = teams::team_color(name).map(String::from);
            }
        }
    }

    fn merge_timing(&mut self, number: String, update: TimingUpdate) {
        let line = self.state.timing.entry(number).or_default();

        merge_opt(&mut line.gap_to_leader, update.gap_to_leader);
        merge_opt(&mut line.interval, update.interval);
        merge_opt(&mut line.last_lap_time, update.last_lap_time);
        merge_opt(&mut line.best_lap_time, update.best_lap_time);
        merge_opt(&mut line.sector1, update.sector1);
        merge_opt(&mut line.sector2, update.sector2);
        merge_opt(&mut line.sector3, update.sector3);
        if update.position.is_some() {
            line.position = update.position;
        }
        if let Some(in_pit) = update.in_pit {
            line.in_pit = in_pit;
        }
        if let Some(retired) = update.retired {
            line.retired = retired;
        }
        if let Some(stopped) = update.stopped {
            line.stopped = stopped;
        }
    }

    fn merge_weather(&mut self, update: WeatherUpdate) {
        let weather = self.state.weather.get_or_insert_with(Weather::default);

        merge_opt(&mut weather.air_temp, update.air_temp);
        merge_opt(&mut weather.track_temp, update.track_temp);
        merge_opt(&mut weather.humidity, update.humidity);
        merge_opt(&mut weather.wind_speed, update.wind_speed);
        merge_opt(&mut weather.wind_direction, update.wind_direction);
        merge_opt(&mut weather.pressure, update.pressure);
        if let Some(rainfall) = update.rainfall {
            weather.rainfall = rainfall;
        }
    }
}

/// Overwrite `target` only when the update actually carries a value.
fn merge_opt<T>(target: &mut Option<T>, update: Option<T>) {
    if update.is_some() {
        *target = update;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Flag, TyreCompound};
    use serde_json::json;

    fn acc_with(topic: &str, data: Value) -> StateAccumulator {
        let mut acc = StateAccumulator::new();
        acc.apply(topic, &data, Some("2024-08-25T13:00:00Z"));
        acc
    }

    #[test]
    fn test_snapshot_independence() {
        let mut acc = acc_with("TrackStatus", json!({"Status": "1"}));
        let s1 = acc.snapshot();
        acc.apply("TrackStatus", &json!({"Status": "5"}), None);
        let s2 = acc.snapshot();

        assert_eq!(s1.track_status.flag, Flag::Green);
        assert_eq!(s2.track_status.flag, Flag::Red);
        assert_eq!(acc.get().track_status.flag, Flag::Red);
    }

    #[test]
    fn test_unknown_flag_leaves_status_unchanged() {
        let mut acc = acc_with("TrackStatus", json!({"Status": "2", "Message": "YELLOW"}));
        acc.apply("TrackStatus", &json!({"Status": "99"}), Some("2024-08-25T13:01:00Z"));

        assert_eq!(acc.get().track_status.flag, Flag::Yellow);
        assert_eq!(acc.get().track_status.message.as_deref(), Some("YELLOW"));
        // Timestamp still advances.
        assert_eq!(
            acc.get().timestamp.as_deref(),
            Some("2024-08-25T13:01:00Z")
        );
    }

    #[test]
    fn test_unknown_topic_updates_only_timestamp() {
        let mut acc = StateAccumulator::new();
        acc.apply("ExtrapolatedClock", &json!({"Remaining": "01:00:00"}), Some("t1"));
        assert_eq!(acc.get().timestamp.as_deref(), Some("t1"));
        assert_eq!(*acc.get(), SessionState {
            timestamp: Some("t1".to_string()),
            ..Default::default()
        });
    }

    #[test]
    fn test_partial_merge_preserves_unmentioned_fields() {
        let mut acc = acc_with(
            "TimingData",
            json!({"Lines": {"1": {"Position": "1", "GapToLeader": "", "InPit": false}}}),
        );
        acc.apply(
            "TimingData",
            &json!({"Lines": {"1": {"LastLapTime": {"Value": "1:31.0"}}}}),
            None,
        );

        let line = &acc.get().timing["1"];
        assert_eq!(line.position, Some(1));
        assert_eq!(line.last_lap_time.as_deref(), Some("1:31.0"));
        assert!(!line.in_pit);
    }

    #[test]
    fn test_driver_merge_and_team_color_fill() {
        let mut acc = acc_with(
            "DriverList",
            json!({"81": {"RacingNumber": "81", "Tla": "PIA", "TeamName": "McLaren"}}),
        );
        let driver = &acc.get().drivers["81"];
        assert_eq!(driver.team_color.as_deref(), Some("FF8000"));

        // A later diff with an explicit colour wins.
        acc.apply(
            "DriverList",
            &json!({"81": {"RacingNumber": "81", "TeamColour": "FF8001"}}),
            None,
        );
        assert_eq!(acc.get().drivers["81"].team_color.as_deref(), Some("FF8001"));
        // And the earlier fields survived the partial merge.
        assert_eq!(acc.get().drivers["81"].abbreviation.as_deref(), Some("PIA"));
    }

    #[test]
    fn test_stint_replacement() {
        let mut acc = acc_with(
            "TimingAppData",
            json!({"Lines": {"1": {"Stints": {"0": {"Compound": "SOFT", "New": "true"}}}}}),
        );
        assert_eq!(acc.get().stints["1"].stint_number, 0);

        acc.apply(
            "TimingAppData",
            &json!({"Lines": {"1": {"Stints": {"1": {"Compound": "HARD", "New": "false"}}}}}),
            None,
        );
        let stint = &acc.get().stints["1"];
        assert_eq!(stint.stint_number, 1);
        assert_eq!(stint.compound, TyreCompound::Hard);
    }

    #[test]
    fn test_weather_merge_and_coercion() {
        let mut acc = acc_with("WeatherData", json!({"AirTemp": "25.0", "Rainfall": "0"}));
        acc.apply("WeatherData", &json!({"Rainfall": "1"}), None);

        let weather = acc.get().weather.as_ref().unwrap();
        assert_eq!(weather.air_temp, Some(25.0));
        assert!(weather.rainfall);
    }

    #[test]
    fn test_top_three_withheld_clears() {
        let mut acc = acc_with(
            "TopThree",
            json!({"Lines": [{"Position": "1", "RacingNumber": "1", "Tla": "VER"}]}),
        );
        assert_eq!(acc.get().top_three.len(), 1);

        acc.apply("TopThree", &json!({"Withheld": true}), None);
        assert!(acc.get().top_three.is_empty());
    }

    #[test]
    fn test_race_control_empty_preserves_prior() {
        let mut acc = acc_with(
            "RaceControlMessages",
            json!({"Messages": {"1": {"Message": "GREEN LIGHT"}}}),
        );
        acc.apply("RaceControlMessages", &json!({"Messages": {}}), None);
        assert_eq!(
            acc.get()
                .latest_race_control_message
                .as_ref()
                .unwrap()
                .message,
            "GREEN LIGHT"
        );
    }

    #[test]
    fn test_idempotent_apply() {
        let diff = json!({"Lines": {"1": {"Position": "1"}, "4": {"Position": "2"}}});
        let mut acc = StateAccumulator::new();
        acc.apply("TimingData", &diff, Some("t"));
        let once = acc.snapshot();
        acc.apply("TimingData", &diff, Some("t"));
        assert_eq!(once, acc.snapshot());
    }

    #[test]
    fn test_reset() {
        let mut acc = acc_with("TrackStatus", json!({"Status": "5"}));
        acc.reset();
        assert_eq!(*acc.get(), SessionState::default());
    }

    #[test]
    fn test_seeded_accumulator_is_independent_of_seed() {
        let mut seed = SessionState::default();
        seed.track_status.flag = Flag::Red;

        let mut acc = StateAccumulator::with_initial(&seed);
        acc.apply("TrackStatus", &json!({"Status": "1"}), None);

        assert_eq!(seed.track_status.flag, Flag::Red);
        assert_eq!(acc.get().track_status.flag, Flag::Green);
    }
}
