//! Recording listing endpoint.

use axum::extract::State;
use axum::Json;

use pitwall_ingest::{list_recordings, RecordingSummary};

use crate::error::ApiError;
use crate::state::AppState;

/// List recorded sessions found in the recordings directory.
pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<Vec<RecordingSummary>>, ApiError> {
    let recordings = list_recordings(&state.config.recordings_dir)?;
    Ok(Json(recordings))
}
