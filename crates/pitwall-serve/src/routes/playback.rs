//! Playback control endpoints.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use pitwall_ingest::{ArchiveConfig, ArchiveSource, DataSource, PlaybackInfo, RecordedSource};

use crate::error::ApiError;
use crate::state::AppState;

/// Load request: either a recording directory name or an archive session
/// path.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    pub recording: Option<String>,
    pub archive_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SpeedRequest {
    pub speed: f64,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub to: String,
}

/// Current playback position and status.
pub async fn info(State(state): State<AppState>) -> Json<PlaybackInfo> {
    Json(state.controller.info())
}

/// Load a timeline into the controller from a recording or the archive.
pub async fn load(
    State(state): State<AppState>,
    Json(request): Json<LoadRequest>,
) -> Result<Json<PlaybackInfo>, ApiError> {
    let mut source: Box<dyn DataSource> = match (&request.recording, &request.archive_path) {
        (Some(name), None) => {
            // Recording names are directory names; reject path traversal.
            if name.contains('/') || name.contains("..") {
                return Err(ApiError::BadRequest("invalid recording name".to_string()));
            }
            let dir = state.config.recordings_dir.join(name);
            if !dir.is_dir() {
                return Err(ApiError::NotFound(format!("no recording named {name}")));
            }
            Box::new(RecordedSource::new(dir))
        }
        (None, Some(path)) => Box::new(ArchiveSource::new(ArchiveConfig {
            base_url: state.config.archive_base_url.clone(),
            session_path: path.clone(),
        })),
        _ => {
            return Err(ApiError::BadRequest(
                "specify exactly one of recording, archivePath".to_string(),
            ))
        }
    };

    let initial = source.initial_state().await?;
    let timeline = source.timeline().await?;
    source.close().await?;

    state.controller.load(timeline, initial);
    Ok(Json(state.controller.info()))
}

pub async fn play(State(state): State<AppState>) -> Json<PlaybackInfo> {
    state.controller.play();
    Json(state.controller.info())
}

pub async fn pause(State(state): State<AppState>) -> Json<PlaybackInfo> {
    state.controller.pause();
    Json(state.controller.info())
}

pub async fn stop(State(state): State<AppState>) -> Json<PlaybackInfo> {
    state.controller.stop();
    Json(state.controller.info())
}

/// Set the speed multiplier. Non-positive values fall back to 1.
pub async fn speed(
    State(state): State<AppState>,
    Json(request): Json<SpeedRequest>,
) -> Json<PlaybackInfo> {
    state.controller.set_speed(request.speed);
    Json(state.controller.info())
}

/// Seek to an RFC3339 timestamp. Garbage is rejected before it reaches
/// the controller.
pub async fn seek(
    State(state): State<AppState>,
    Json(request): Json<SeekRequest>,
) -> Result<Json<PlaybackInfo>, ApiError> {
    if chrono::DateTime::parse_from_rfc3339(&request.to).is_err() {
        return Err(ApiError::BadRequest(format!(
            "not a timestamp: {}",
            request.to
        )));
    }
    state.controller.seek(&request.to);
    Ok(Json(state.controller.info()))
}
