//! API route definitions.

mod health;
mod playback;
mod recordings;
mod ws;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the complete API router.
///
/// # Route Structure
///
/// - `GET /health` - Health check
/// - `GET /ws` - WebSocket fan-out of playback/pipeline events
///
/// ## Playback control
/// - `GET /api/v1/recordings` - List recorded sessions
/// - `GET /api/v1/playback` - Current playback state
/// - `POST /api/v1/playback/load` - Load a recording or archive session
/// - `POST /api/v1/playback/play` - Start/resume
/// - `POST /api/v1/playback/pause` - Pause
/// - `POST /api/v1/playback/stop` - Stop and rewind
/// - `POST /api/v1/playback/speed` - Set speed multiplier
/// - `POST /api/v1/playback/seek` - Seek to a timestamp
pub fn router(state: AppState) -> Router {
    let api_v1 = Router::new()
        .route("/recordings", get(recordings::list))
        .route("/playback", get(playback::info))
        .route("/playback/load", post(playback::load))
        .route("/playback/play", post(playback::play))
        .route("/playback/pause", post(playback::pause))
        .route("/playback/stop", post(playback::stop))
        .route("/playback/speed", post(playback::speed))
        .route("/playback/seek", post(playback::seek));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ws", get(ws::upgrade))
        .nest("/api/v1", api_v1)
        .with_state(state)
}
