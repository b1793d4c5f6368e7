//! Weather change detector.

use crate::events::SessionEvent;
use crate::types::SessionState;

/// Emit when the rainfall boolean flips. A snapshot without weather data is
/// treated as dry on the `prev` side; a `curr` without weather emits
/// nothing.
pub(super) fn detect(prev: &SessionState, curr: &SessionState) -> Vec<SessionEvent> {
    let Some(curr_weather) = &curr.weather else {
        return Vec::new();
    };

    let previous_rainfall = prev.weather.as_ref().map(|w| w.rainfall).unwrap_or(false);
    if curr_weather.rainfall == previous_rainfall {
        return Vec::new();
    }

    vec![SessionEvent::WeatherChange {
        previous_rainfall,
        new_rainfall: curr_weather.rainfall,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Weather;

    fn with_rainfall(rainfall: bool) -> SessionState {
        SessionState {
            weather: Some(Weather {
                rainfall,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_rain_starts() {
        let events = detect(&with_rainfall(false), &with_rainfall(true));
        assert_eq!(
            events,
            vec![SessionEvent::WeatherChange {
                previous_rainfall: false,
                new_rainfall: true,
            }]
        );
    }

    #[test]
    fn test_missing_prev_weather_treated_as_dry() {
        let events = detect(&SessionState::default(), &with_rainfall(true));
        assert_eq!(events.len(), 1);
        // Dry start reported as dry→rain, not a spurious rain→rain.
        assert!(detect(&SessionState::default(), &with_rainfall(false)).is_empty());
    }

    #[test]
    fn test_missing_curr_weather_is_silent() {
        assert!(detect(&with_rainfall(true), &SessionState::default()).is_empty());
    }

    #[test]
    fn test_no_change_is_silent() {
        assert!(detect(&with_rainfall(true), &with_rainfall(true)).is_empty());
    }
}
