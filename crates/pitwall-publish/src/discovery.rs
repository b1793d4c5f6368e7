//! Auto-discovery entity configs.
//!
//! The home-automation platform discovers entities from retained config
//! payloads under `<discovery_prefix>/sensor/<object_id>/config`. Publishing
//! an empty retained payload on the same topic removes the entity again;
//! that is how session-scoped entities are torn down.

use serde_json::json;

use crate::publisher::BusMessage;

/// Definition of one discovered sensor entity.
#[derive(Debug, Clone)]
pub struct EntityDef {
    /// Unique object id, e.g. `f12mqtt_session_flag`.
    pub object_id: String,
    /// Display name.
    pub name: String,
    /// Topic the entity reads its state from.
    pub state_topic: String,
    /// Material-design icon, e.g. `mdi:flag`.
    pub icon: Option<&'static str>,
}

impl EntityDef {
    pub fn new(
        object_id: impl Into<String>,
        name: impl Into<String>,
        state_topic: impl Into<String>,
    ) -> Self {
        EntityDef {
            object_id: object_id.into(),
            name: name.into(),
            state_topic: state_topic.into(),
            icon: None,
        }
    }

    pub fn icon(mut self, icon: &'static str) -> Self {
        self.icon = Some(icon);
        self
    }

    /// Discovery config topic for this entity.
    pub fn config_topic(&self, discovery_prefix: &str) -> String {
        format!("{}/sensor/{}/config", discovery_prefix, self.object_id)
    }

    /// Retained discovery config message.
    pub fn config_message(&self, discovery_prefix: &str) -> BusMessage {
        let mut config = json!({
            "name": self.name,
            "state_topic": self.state_topic,
            "unique_id": self.object_id,
            "device": {
                "identifiers": ["pitwall"],
                "name": "Pitwall",
                "manufacturer": "pitwall",
                "model": "live timing bridge",
            },
        });
        if let Some(icon) = self.icon {
            config["icon"] = json!(icon);
        }

        BusMessage {
            topic: self.config_topic(discovery_prefix),
            payload: config.to_string(),
            retained: true,
        }
    }
}

/// Removal message: an empty retained payload on the config topic.
pub fn removal_message(config_topic: &str) -> BusMessage {
    BusMessage {
        topic: config_topic.to_string(),
        payload: String::new(),
        retained: true,
    }
}
