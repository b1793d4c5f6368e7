//! Session recorder.
//!
//! Writes three artefacts into `<base>/<year>-<sessionKey>/`:
//!
//! - `metadata.json` - session identity plus start/end timestamps
//! - `subscribe.json` - the full initial snapshot at `start()`
//! - `live.jsonl` - append-only, one `{"ts","topic","data"}` per line
//!
//! Replay loads all three and feeds the JSONL through the pipeline in
//! order, producing identical events and an identical end snapshot to the
//! live run. A failed write drops that line with a log entry and recording
//! continues; `stop()` flushes and is idempotent.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use pitwall_core::{SessionState, TimelineEntry};

use crate::error::{Error, Result};

pub const METADATA_FILE: &str = "metadata.json";
pub const SNAPSHOT_FILE: &str = "subscribe.json";
pub const LOG_FILE: &str = "live.jsonl";

/// Session identity persisted alongside a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMeta {
    pub session_key: i64,
    pub year: i32,
    pub session_name: String,
    pub session_type: String,
    pub circuit: String,
    pub start_time: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end_time: Option<String>,
}

impl RecordingMeta {
    /// Directory name for this session: `<year>-<sessionKey>`.
    pub fn dir_name(&self) -> String {
        format!("{}-{}", self.year, self.session_key)
    }
}

/// Append-only session recorder. One writer owns the log stream.
pub struct Recorder {
    dir: PathBuf,
    meta: RecordingMeta,
    log: Option<BufWriter<File>>,
    lines_written: u64,
}

impl Recorder {
    /// Create the recording directory and write `metadata.json` plus
    /// `subscribe.json`, then open the append-only log.
    pub fn start(
        base_dir: &Path,
        meta: RecordingMeta,
        initial_state: &SessionState,
    ) -> Result<Recorder> {
        let dir = base_dir.join(meta.dir_name());
        fs::create_dir_all(&dir)?;

        let meta_json = serde_json::to_vec_pretty(&meta)?;
        fs::write(dir.join(METADATA_FILE), meta_json)?;

        let snapshot_json = serde_json::to_vec(initial_state)?;
        fs::write(dir.join(SNAPSHOT_FILE), snapshot_json)?;

        let log = File::options()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE))?;

        info!(dir = %dir.display(), "recording started");

        Ok(Recorder {
            dir,
            meta,
            log: Some(BufWriter::new(log)),
            lines_written: 0,
        })
    }

    /// Append one message to the log. An I/O failure drops the line with a
    /// warning; recording continues.
    pub fn write(&mut self, entry: &TimelineEntry) {
        let Some(log) = self.log.as_mut() else {
            return;
        };

        let result = serde_json::to_string(entry)
            .map_err(Error::from)
            .and_then(|line| {
                log.write_all(line.as_bytes())?;
                log.write_all(b"\n")?;
                Ok(())
            });

        match result {
            Ok(()) => {
                self.lines_written += 1;
                counter!("recorder_lines_total").increment(1);
            }
            Err(e) => {
                counter!("recorder_write_errors_total").increment(1);
                warn!(error = %e, topic = %entry.topic, "dropping recording line");
            }
        }
    }

    /// Update `metadata.json` with the session end timestamp.
    pub fn finish(&mut self, end_time: &str) {
        self.meta.end_time = Some(end_time.to_string());
        match serde_json::to_vec_pretty(&self.meta) {
            Ok(json) => {
                if let Err(e) = fs::write(self.dir.join(METADATA_FILE), json) {
                    warn!(error = %e, "failed to update recording metadata");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialise recording metadata"),
        }
    }

    /// Flush and close the log. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(mut log) = self.log.take() {
            if let Err(e) = log.flush() {
                warn!(error = %e, "failed to flush recording log");
            }
            info!(
                dir = %self.dir.display(),
                lines = self.lines_written,
                "recording stopped"
            );
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Summary of one recorded session found on disk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    /// Directory name, used as the recording identifier.
    pub name: String,
    #[serde(flatten)]
    pub meta: RecordingMeta,
}

/// Scan a recordings directory for immediate subdirectories containing
/// `metadata.json`. Unreadable entries are skipped with a warning.
pub fn list_recordings(base_dir: &Path) -> Result<Vec<RecordingSummary>> {
    let mut recordings = Vec::new();

    if !base_dir.is_dir() {
        return Ok(recordings);
    }

    for dir_entry in fs::read_dir(base_dir)? {
        let dir_entry = dir_entry?;
        let path = dir_entry.path();
        if !path.is_dir() {
            continue;
        }
        let meta_path = path.join(METADATA_FILE);
        if !meta_path.is_file() {
            continue;
        }

        let meta: RecordingMeta = match fs::read(&meta_path)
            .map_err(Error::from)
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(Error::from))
        {
            Ok(meta) => meta,
            Err(e) => {
                warn!(path = %meta_path.display(), error = %e, "skipping unreadable recording");
                continue;
            }
        };

        recordings.push(RecordingSummary {
            name: dir_entry.file_name().to_string_lossy().into_owned(),
            meta,
        });
    }

    recordings.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(recordings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn meta() -> RecordingMeta {
        RecordingMeta {
            session_key: 9590,
            year: 2024,
            session_name: "Race".to_string(),
            session_type: "Race".to_string(),
            circuit: "Zandvoort".to_string(),
            start_time: "2024-08-25T13:00:00Z".to_string(),
            end_time: None,
        }
    }

    fn entry(ts: &str) -> TimelineEntry {
        TimelineEntry {
            timestamp: ts.to_string(),
            topic: "TrackStatus".to_string(),
            data: json!({"Status": "1"}),
        }
    }

    #[test]
    fn test_start_writes_artefacts() {
        let tmp = TempDir::new().unwrap();
        let recorder = Recorder::start(tmp.path(), meta(), &SessionState::default()).unwrap();

        let dir = tmp.path().join("2024-9590");
        assert_eq!(recorder.dir(), dir);
        assert!(dir.join(METADATA_FILE).is_file());
        assert!(dir.join(SNAPSHOT_FILE).is_file());
        assert!(dir.join(LOG_FILE).is_file());
    }

    #[test]
    fn test_write_appends_jsonl() {
        let tmp = TempDir::new().unwrap();
        let mut recorder = Recorder::start(tmp.path(), meta(), &SessionState::default()).unwrap();

        recorder.write(&entry("2024-08-25T13:00:00Z"));
        recorder.write(&entry("2024-08-25T13:00:01Z"));
        assert_eq!(recorder.lines_written(), 2);
        recorder.stop();

        let log = fs::read_to_string(tmp.path().join("2024-9590").join(LOG_FILE)).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: TimelineEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.timestamp, "2024-08-25T13:00:00Z");
        assert_eq!(first.topic, "TrackStatus");
    }

    #[test]
    fn test_stop_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let mut recorder = Recorder::start(tmp.path(), meta(), &SessionState::default()).unwrap();
        recorder.write(&entry("2024-08-25T13:00:00Z"));
        recorder.stop();
        recorder.stop();
        // Writes after stop are silently ignored.
        recorder.write(&entry("2024-08-25T13:00:01Z"));
        assert_eq!(recorder.lines_written(), 1);
    }

    #[test]
    fn test_finish_records_end_time() {
        let tmp = TempDir::new().unwrap();
        let mut recorder = Recorder::start(tmp.path(), meta(), &SessionState::default()).unwrap();
        recorder.finish("2024-08-25T15:00:00Z");
        recorder.stop();

        let bytes = fs::read(tmp.path().join("2024-9590").join(METADATA_FILE)).unwrap();
        let loaded: RecordingMeta = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(loaded.end_time.as_deref(), Some("2024-08-25T15:00:00Z"));
    }

    #[test]
    fn test_list_recordings() {
        let tmp = TempDir::new().unwrap();
        {
            let mut recorder =
                Recorder::start(tmp.path(), meta(), &SessionState::default()).unwrap();
            recorder.write(&entry("2024-08-25T13:00:00Z"));
        }
        // A directory without metadata is not a recording.
        fs::create_dir(tmp.path().join("junk")).unwrap();

        let recordings = list_recordings(tmp.path()).unwrap();
        assert_eq!(recordings.len(), 1);
        assert_eq!(recordings[0].name, "2024-9590");
        assert_eq!(recordings[0].meta.session_key, 9590);
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        let recordings = list_recordings(&tmp.path().join("nope")).unwrap();
        assert!(recordings.is_empty());
    }
}
