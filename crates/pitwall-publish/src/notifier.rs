//! LED-matrix notifier payloads.
//!
//! Builds the compact per-app payloads and event notifications for
//! AWTRIX-style matrix devices: custom apps live under
//! `<prefix>/custom/<app>` (retained by the device, cleared with an empty
//! payload), one-shot notifications go to `<prefix>/notify`.

use serde_json::json;

use pitwall_core::types::Flag;
use pitwall_core::{SessionEvent, SessionState};

use crate::publisher::BusMessage;

/// Notifier device settings.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Device base topic, e.g. `awtrix_b77d60`.
    pub prefix: String,
}

/// Visual decoration for a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagStyle {
    pub background: &'static str,
    pub text: &'static str,
    pub effect: Option<&'static str>,
    pub dark_text: bool,
}

/// Appearance table for flag displays.
pub fn flag_style(flag: Flag) -> FlagStyle {
    match flag {
        Flag::Green => FlagStyle {
            background: "#00FF00",
            text: "GREEN",
            effect: None,
            dark_text: false,
        },
        Flag::Yellow => FlagStyle {
            background: "#FFFF00",
            text: "YELLOW",
            effect: None,
            dark_text: true,
        },
        Flag::Red => FlagStyle {
            background: "#FF0000",
            text: "RED FLAG",
            effect: Some("Pulse"),
            dark_text: false,
        },
        Flag::Sc => FlagStyle {
            background: "#FFA500",
            text: "SAFETY CAR",
            effect: Some("Pulse"),
            dark_text: false,
        },
        Flag::Vsc => FlagStyle {
            background: "#FFA500",
            text: "VSC",
            effect: None,
            dark_text: false,
        },
        Flag::VscEnding => FlagStyle {
            background: "#00FF00",
            text: "VSC END",
            effect: None,
            dark_text: false,
        },
        Flag::Chequered => FlagStyle {
            background: "#FFFFFF",
            text: "CHEQUERED",
            effect: None,
            dark_text: true,
        },
    }
}

impl FlagStyle {
    fn text_color(&self) -> &'static str {
        if self.dark_text {
            "#000000"
        } else {
            "#FFFFFF"
        }
    }
}

impl NotifierConfig {
    fn app_topic(&self, app: &str) -> String {
        format!("{}/custom/{}", self.prefix, app)
    }

    fn notify_topic(&self) -> String {
        format!("{}/notify", self.prefix)
    }

    /// Compact per-app payloads for the current snapshot: flag app, lap
    /// app, at most three driver apps, and the top-three app.
    pub fn app_messages(
        &self,
        state: &SessionState,
        favourite_drivers: &[String],
    ) -> Vec<BusMessage> {
        let mut messages = Vec::new();

        let style = flag_style(state.track_status.flag);
        messages.push(BusMessage {
            topic: self.app_topic("f1_flag"),
            payload: json!({
                "text": style.text,
                "color": style.text_color(),
                "background": style.background,
                "effect": style.effect,
            })
            .to_string(),
            retained: false,
        });

        if state.lap_count.total > 0 {
            messages.push(BusMessage {
                topic: self.app_topic("f1_lap"),
                payload: json!({
                    "text": format!("L{}/{}", state.lap_count.current, state.lap_count.total),
                    "color": "#FFFFFF",
                })
                .to_string(),
                retained: false,
            });
        }

        for number in favourite_drivers.iter().take(3) {
            let Some(line) = state.timing.get(number) else {
                continue;
            };
            let Some(position) = line.position else {
                continue;
            };
            let abbreviation = state.abbreviation_for(number);
            let color = state
                .team_color_for(number)
                .map(|c| format!("#{c}"))
                .unwrap_or_else(|| "#FFFFFF".to_string());
            messages.push(BusMessage {
                topic: self.app_topic(&format!("f1_driver_{number}")),
                payload: json!({
                    "text": format!("{abbreviation} P{position}"),
                    "color": color,
                })
                .to_string(),
                retained: false,
            });
        }

        if !state.top_three.is_empty() {
            let text = state
                .top_three
                .iter()
                .map(|entry| {
                    entry
                        .abbreviation
                        .clone()
                        .unwrap_or_else(|| entry.driver_number.clone())
                })
                .collect::<Vec<_>>()
                .join(" ");
            messages.push(BusMessage {
                topic: self.app_topic("f1_top3"),
                payload: json!({"text": text, "color": "#FFFFFF"}).to_string(),
                retained: false,
            });
        }

        messages
    }

    /// One-shot notification for a semantic event, decorated per the flag
    /// appearance table.
    pub fn event_notification(&self, event: &SessionEvent) -> BusMessage {
        let payload = match event {
            SessionEvent::FlagChange { new_flag, .. } => {
                let style = flag_style(*new_flag);
                json!({
                    "text": style.text,
                    "color": style.text_color(),
                    "background": style.background,
                    "effect": style.effect,
                    "duration": 10,
                    "wakeup": true,
                })
            }
            SessionEvent::Overtake {
                overtaking_abbreviation,
                overtaken_abbreviation,
                new_position,
                overtaking_team_color,
                ..
            } => json!({
                "text": format!(
                    "{overtaking_abbreviation} P{new_position} ({overtaken_abbreviation})"
                ),
                "color": color_or_white(overtaking_team_color.as_deref()),
                "duration": 8,
                "wakeup": false,
            }),
            SessionEvent::PitStop {
                abbreviation,
                new_compound,
                team_color,
                ..
            } => json!({
                "text": format!("{abbreviation} BOX {new_compound}"),
                "color": color_or_white(team_color.as_deref()),
                "duration": 8,
                "wakeup": false,
            }),
            SessionEvent::WeatherChange { new_rainfall, .. } => json!({
                "text": if *new_rainfall { "RAIN" } else { "DRY" },
                "color": "#FFFFFF",
                "background": if *new_rainfall { "#0000FF" } else { "#303030" },
                "duration": 10,
                "wakeup": true,
            }),
        };

        BusMessage {
            topic: self.notify_topic(),
            payload: payload.to_string(),
            retained: false,
        }
    }
}

fn color_or_white(team_color: Option<&str>) -> String {
    team_color
        .map(|c| format!("#{c}"))
        .unwrap_or_else(|| "#FFFFFF".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitwall_core::types::{LapCount, TimingLine, TrackStatus, TyreCompound};
    use serde_json::Value;

    fn config() -> NotifierConfig {
        NotifierConfig {
            prefix: "awtrix_test".to_string(),
        }
    }

    #[test]
    fn test_flag_style_table() {
        assert_eq!(flag_style(Flag::Green).background, "#00FF00");
        assert_eq!(flag_style(Flag::Red).text, "RED FLAG");
        assert_eq!(flag_style(Flag::Red).effect, Some("Pulse"));
        assert_eq!(flag_style(Flag::Sc).effect, Some("Pulse"));
        assert_eq!(flag_style(Flag::Vsc).effect, None);
        assert!(flag_style(Flag::Yellow).dark_text);
        assert!(flag_style(Flag::Chequered).dark_text);
        assert_eq!(flag_style(Flag::VscEnding).background, "#00FF00");
    }

    #[test]
    fn test_flag_app_message() {
        let state = SessionState {
            track_status: TrackStatus {
                flag: Flag::Sc,
                message: None,
            },
            ..Default::default()
        };
        let messages = config().app_messages(&state, &[]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "awtrix_test/custom/f1_flag");

        let payload: Value = serde_json::from_str(&messages[0].payload).unwrap();
        assert_eq!(payload["text"], "SAFETY CAR");
        assert_eq!(payload["effect"], "Pulse");
        assert_eq!(payload["background"], "#FFA500");
    }

    #[test]
    fn test_driver_apps_capped_at_three() {
        let mut state = SessionState {
            lap_count: LapCount {
                current: 2,
                total: 57,
            },
            ..Default::default()
        };
        let favourites: Vec<String> = ["1", "4", "16", "44"]
            .iter()
            .map(|n| n.to_string())
            .collect();
        for (i, number) in favourites.iter().enumerate() {
            state.timing.insert(
                number.clone(),
                TimingLine {
                    position: Some(i as u32 + 1),
                    ..Default::default()
                },
            );
        }

        let messages = config().app_messages(&state, &favourites);
        let driver_apps = messages
            .iter()
            .filter(|m| m.topic.contains("/custom/f1_driver_"))
            .count();
        assert_eq!(driver_apps, 3);
        // flag + lap + 3 drivers
        assert_eq!(messages.len(), 5);
    }

    #[test]
    fn test_pit_notification() {
        let event = SessionEvent::PitStop {
            driver_number: "1".to_string(),
            abbreviation: "VER".to_string(),
            team_color: Some("3671C6".to_string()),
            new_compound: TyreCompound::Hard,
            stint_number: 2,
        };
        let message = config().event_notification(&event);
        assert_eq!(message.topic, "awtrix_test/notify");
        assert!(!message.retained);

        let payload: Value = serde_json::from_str(&message.payload).unwrap();
        assert_eq!(payload["text"], "VER BOX HARD");
        assert_eq!(payload["color"], "#3671C6");
    }

    #[test]
    fn test_weather_notification_wakes_up() {
        let event = SessionEvent::WeatherChange {
            previous_rainfall: false,
            new_rainfall: true,
        };
        let payload: Value =
            serde_json::from_str(&config().event_notification(&event).payload).unwrap();
        assert_eq!(payload["text"], "RAIN");
        assert_eq!(payload["wakeup"], true);
    }
}
