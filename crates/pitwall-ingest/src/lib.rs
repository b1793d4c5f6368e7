//! Feed ingestion, session recording and playback.
//!
//! This crate owns everything between the outside world and the core
//! pipeline:
//!
//! - [`feed`] - the upstream hub/topic WebSocket client
//! - [`recorder`] - the on-disk session recording format
//! - [`source`] - playback data sources (recorded directory, REST archive)
//! - [`playback`] - the playback controller replaying a timeline through
//!   the pipeline with live-identical semantics

pub mod feed;
pub mod playback;
pub mod recorder;
pub mod source;

mod error;

pub use error::{Error, Result};
pub use feed::{FeedClient, FeedConfig, FeedEvent};
pub use playback::{PlaybackController, PlaybackEvent, PlaybackInfo, PlaybackStatus};
pub use recorder::{list_recordings, Recorder, RecordingMeta, RecordingSummary};
pub use source::{ArchiveConfig, ArchiveSource, DataSource, RecordedSource};
