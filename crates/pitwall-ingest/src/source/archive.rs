//! Data source backed by the historical REST archive.
//!
//! The archive serves one append-log file per topic
//! (`<base>/<session_path>/<Topic>.jsonStream`), each line a
//! session-relative offset glued to a JSON payload:
//!
//! ```text
//! 00:00:07.123{"Status":"1","Message":"AllClear"}
//! ```
//!
//! This adapter fetches the canonical topics, converts offsets to absolute
//! RFC3339 timestamps using the session start announced in
//! `SessionInfo.jsonStream`, and merge-sorts everything into one timeline -
//! the same `(timestamp, topic, data)` shape the recorder produces.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use pitwall_core::{SessionState, Timeline, TimelineEntry};

use super::{spawn_stream, DataSource};
use crate::error::{Error, Result};

/// Topics the archive adapter shapes into the canonical timeline.
const ARCHIVE_TOPICS: &[&str] = &["TrackStatus", "TimingData", "TimingAppData", "DriverList"];

/// Configuration for the archive source.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Base URL of the static archive.
    pub base_url: String,

    /// Session path below the base URL, e.g.
    /// `2024/2024-08-25_Dutch_Grand_Prix/2024-08-25_Race`.
    pub session_path: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        ArchiveConfig {
            base_url: "https://livetiming.formula1.com/static".to_string(),
            session_path: String::new(),
        }
    }
}

/// Historical REST archive source.
pub struct ArchiveSource {
    config: ArchiveConfig,
    client: reqwest::Client,
    loaded: Option<Timeline>,
}

impl ArchiveSource {
    pub fn new(config: ArchiveConfig) -> Self {
        ArchiveSource {
            config,
            client: reqwest::Client::new(),
            loaded: None,
        }
    }

    fn topic_url(&self, topic: &str) -> String {
        format!(
            "{}/{}/{}.jsonStream",
            self.config.base_url.trim_end_matches('/'),
            self.config.session_path.trim_matches('/'),
            topic
        )
    }

    async fn fetch_stream(&self, topic: &str) -> Result<String> {
        let url = self.topic_url(topic);
        debug!(url = %url, "fetching archive stream");
        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    /// Resolve the session start instant from `SessionInfo.jsonStream`.
    async fn fetch_session_start(&self) -> Result<DateTime<Utc>> {
        let body = self.fetch_stream("SessionInfo").await?;
        let (_, info) = body
            .lines()
            .find_map(parse_stream_line)
            .ok_or_else(|| Error::Feed("empty SessionInfo stream".to_string()))?;
        session_start_utc(&info)
            .ok_or_else(|| Error::Feed("SessionInfo carries no usable StartDate".to_string()))
    }

    async fn load(&mut self) -> Result<&Timeline> {
        if self.loaded.is_none() {
            let start = self.fetch_session_start().await?;
            let mut entries = Vec::new();

            for topic in ARCHIVE_TOPICS {
                let body = match self.fetch_stream(topic).await {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(topic, error = %e, "skipping unavailable archive topic");
                        continue;
                    }
                };
                for line in body.lines() {
                    let Some((offset, data)) = parse_stream_line(line) else {
                        continue;
                    };
                    let Some(duration) = parse_offset(offset) else {
                        continue;
                    };
                    entries.push(TimelineEntry {
                        timestamp: rfc3339(start + duration),
                        topic: topic.to_string(),
                        data,
                    });
                }
            }

            self.loaded = Some(Timeline::from_entries(entries));
        }
        Ok(self.loaded.as_ref().expect("just loaded"))
    }
}

#[async_trait]
impl DataSource for ArchiveSource {
    fn name(&self) -> &'static str {
        "archive"
    }

    async fn initial_state(&mut self) -> Result<Option<SessionState>> {
        // The archive has no snapshot; state accumulates from the timeline.
        Ok(None)
    }

    async fn time_range(&mut self) -> Result<Option<(String, String)>> {
        Ok(self
            .load()
            .await?
            .time_range()
            .map(|(a, b)| (a.to_string(), b.to_string())))
    }

    async fn timeline(&mut self) -> Result<Timeline> {
        Ok(self.load().await?.clone())
    }

    async fn stream(
        &mut self,
        from: Option<String>,
        speed: f64,
    ) -> Result<mpsc::Receiver<TimelineEntry>> {
        let timeline = self.load().await?;
        let start = match &from {
            Some(t) => timeline.find_index(t),
            None => 0,
        };
        Ok(spawn_stream(timeline.clone(), start, speed))
    }

    async fn close(&mut self) -> Result<()> {
        self.loaded = None;
        Ok(())
    }
}

/// Split one `.jsonStream` line into its offset prefix and JSON payload.
fn parse_stream_line(line: &str) -> Option<(&str, Value)> {
    let brace = line.find('{')?;
    let (offset, json) = line.split_at(brace);
    let data = serde_json::from_str(json).ok()?;
    Some((offset.trim(), data))
}

/// Parse a session-relative `H:MM:SS.mmm` offset.
fn parse_offset(offset: &str) -> Option<ChronoDuration> {
    let mut parts = offset.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let millis = (seconds * 1000.0).round() as i64;
    Some(ChronoDuration::milliseconds(
        hours * 3_600_000 + minutes * 60_000 + millis,
    ))
}

/// Derive the UTC session start from a `SessionInfo` payload: local
/// `StartDate` minus `GmtOffset`.
fn session_start_utc(info: &Value) -> Option<DateTime<Utc>> {
    let start = info.get("StartDate")?.as_str()?;
    let local = NaiveDateTime::parse_from_str(start, "%Y-%m-%dT%H:%M:%S").ok()?;

    let gmt_offset = info
        .get("GmtOffset")
        .and_then(Value::as_str)
        .and_then(parse_gmt_offset)
        .unwrap_or_else(ChronoDuration::zero);

    Some(DateTime::from_naive_utc_and_offset(local - gmt_offset, Utc))
}

/// Parse a `[-]HH:MM:SS` GMT offset.
fn parse_gmt_offset(offset: &str) -> Option<ChronoDuration> {
    let (negative, rest) = match offset.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, offset),
    };
    let mut parts = rest.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: i64 = parts.next().unwrap_or("0").parse().ok()?;
    let total = ChronoDuration::seconds(hours * 3600 + minutes * 60 + seconds);
    Some(if negative { -total } else { total })
}

fn rfc3339(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
