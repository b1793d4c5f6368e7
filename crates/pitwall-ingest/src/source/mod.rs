//! Playback data sources.
//!
//! A data source hands the playback layer an initial snapshot, the covered
//! time range, and a stream of `(timestamp, topic, data)` entries spaced by
//! wall-clock delays proportional to inter-entry time divided by the speed
//! multiplier. Dropping the stream receiver cancels the producer.
//!
//! Two implementations:
//!
//! - [`RecordedSource`] - reads a directory written by the recorder
//! - [`ArchiveSource`] - shapes the historical REST archive into the same
//!   canonical topic/diff triples

mod archive;
mod recorded;

pub use archive::{ArchiveConfig, ArchiveSource};
pub use recorded::RecordedSource;

use async_trait::async_trait;
use tokio::sync::mpsc;

use pitwall_core::{SessionState, Timeline, TimelineEntry};

use crate::error::Result;

/// Inter-entry delay, capped so large data gaps don't stall playback.
pub(crate) const MAX_GAP_MS: i64 = 5_000;

/// A source of timeline entries for playback.
#[async_trait]
pub trait DataSource: Send {
    /// Human-readable name for logs.
    fn name(&self) -> &'static str;

    /// Snapshot to seed the accumulator with, when the source has one.
    async fn initial_state(&mut self) -> Result<Option<SessionState>>;

    /// First and last entry timestamps, when the source is non-empty.
    async fn time_range(&mut self) -> Result<Option<(String, String)>>;

    /// The full timeline, sorted by timestamp.
    async fn timeline(&mut self) -> Result<Timeline>;

    /// Stream entries starting at `from` (or the beginning), spaced by
    /// inter-entry delays divided by `speed`. Dropping the receiver stops
    /// the producer task.
    async fn stream(
        &mut self,
        from: Option<String>,
        speed: f64,
    ) -> Result<mpsc::Receiver<TimelineEntry>>;

    /// Release underlying resources.
    async fn close(&mut self) -> Result<()>;
}

/// Wall-clock delay between two RFC3339 timestamps at a speed multiplier,
/// clamped to `[0, MAX_GAP_MS]`. Unparseable stamps yield zero.
pub(crate) fn delay_between(
    curr: &str,
    next: &str,
    speed: f64,
) -> std::time::Duration {
    use chrono::DateTime;

    let speed = if speed > 0.0 { speed } else { 1.0 };
    let millis = match (
        DateTime::parse_from_rfc3339(curr),
        DateTime::parse_from_rfc3339(next),
    ) {
        (Ok(a), Ok(b)) => (b - a).num_milliseconds(),
        _ => 0,
    };
    let scaled = (millis.clamp(0, i64::MAX) as f64 / speed) as i64;
    std::time::Duration::from_millis(scaled.clamp(0, MAX_GAP_MS) as u64)
}

/// Spawn the producer task shared by source implementations: walk the
/// timeline from `start_index`, sleeping the scaled gap before each send.
pub(crate) fn spawn_stream(
    timeline: Timeline,
    start_index: usize,
    speed: f64,
) -> mpsc::Receiver<TimelineEntry> {
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let mut index = start_index;
        while let Some(entry) = timeline.at(index) {
            let entry = entry.clone();
            if tx.send(entry.clone()).await.is_err() {
                // Receiver dropped: consumer cancelled the stream.
                return;
            }
            index += 1;
            if let Some(next) = timeline.at(index) {
                let delay = delay_between(&entry.timestamp, &next.timestamp, speed);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_between_scaling_and_cap() {
        let a = "2024-08-25T13:00:00Z";
        let b = "2024-08-25T13:00:01Z";
        assert_eq!(delay_between(a, b, 1.0).as_millis(), 1000);
        assert_eq!(delay_between(a, b, 2.0).as_millis(), 500);
        // Gap far beyond the cap.
        let c = "2024-08-25T14:00:00Z";
        assert_eq!(delay_between(a, c, 1.0).as_millis(), MAX_GAP_MS as u128);
        // Out-of-order stamps clamp to zero.
        assert_eq!(delay_between(b, a, 1.0).as_millis(), 0);
        // Garbage stamps clamp to zero.
        assert_eq!(delay_between("junk", b, 1.0).as_millis(), 0);
        // Non-positive speed treated as 1.
        assert_eq!(delay_between(a, b, 0.0).as_millis(), 1000);
    }
}
