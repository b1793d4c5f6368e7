//! Bridge daemon library: REST control surface and WebSocket fan-out.
//!
//! # Architecture
//!
//! - **AppState**: shared handler state (configuration, playback controller)
//! - **Routes**: health, recording listing, playback control, `/ws` fan-out
//! - **bridge**: the live wiring (feed → pipeline → publisher/recorder) and
//!   the bus command loop used by the daemon binary

pub mod bridge;

mod error;
mod routes;
mod state;

pub use self::error::ApiError;
pub use self::routes::router;
pub use self::state::{AppState, Config};
