//! Bus publishing: entity lifecycle, state and event projection.
//!
//! The [`Publisher`] turns pipeline output into [`BusMessage`] batches
//! (pure, broker-free), the [`mqtt`] module ships them, [`discovery`]
//! builds the auto-discovery configs and [`notifier`] the LED-matrix
//! payloads.

pub mod discovery;
pub mod mqtt;
pub mod notifier;
pub mod publisher;

mod error;

pub use error::{Error, Result};
pub use mqtt::{InboundMessage, MqttClient, MqttConfig};
pub use notifier::{flag_style, NotifierConfig};
pub use publisher::{BusMessage, Publisher, PublisherConfig, StandingsKind};
