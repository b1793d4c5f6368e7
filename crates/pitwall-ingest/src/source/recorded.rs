//! Data source reading a recorded session directory.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use pitwall_core::{SessionState, Timeline, TimelineEntry};

use super::{spawn_stream, DataSource};
use crate::error::Result;
use crate::recorder::{LOG_FILE, SNAPSHOT_FILE};

/// Reads the `subscribe.json` snapshot and `live.jsonl` log produced by the
/// recorder. Missing files are tolerated: no snapshot means a default
/// accumulator seed, no log means an empty timeline. Unparseable log lines
/// are skipped with a warning.
pub struct RecordedSource {
    dir: PathBuf,
    loaded: Option<Loaded>,
}

struct Loaded {
    initial_state: Option<SessionState>,
    timeline: Timeline,
}

impl RecordedSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        RecordedSource {
            dir: dir.into(),
            loaded: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load(&mut self) -> Result<&Loaded> {
        if self.loaded.is_none() {
            let initial_state = read_snapshot(&self.dir.join(SNAPSHOT_FILE));
            let timeline = read_log(&self.dir.join(LOG_FILE))?;
            self.loaded = Some(Loaded {
                initial_state,
                timeline,
            });
        }
        Ok(self.loaded.as_ref().expect("just loaded"))
    }
}

fn read_snapshot(path: &Path) -> Option<SessionState> {
    let bytes = fs::read(path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable initial snapshot");
            None
        }
    }
}

fn read_log(path: &Path) -> Result<Timeline> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return Ok(Timeline::default()),
    };

    let mut entries = Vec::new();
    for (line_num, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TimelineEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(line = line_num + 1, error = %e, "skipping bad log line");
            }
        }
    }
    Ok(Timeline::from_entries(entries))
}

#[async_trait]
impl DataSource for RecordedSource {
    fn name(&self) -> &'static str {
        "recorded"
    }

    async fn initial_state(&mut self) -> Result<Option<SessionState>> {
        Ok(self.load()?.initial_state.clone())
    }

    async fn time_range(&mut self) -> Result<Option<(String, String)>> {
        Ok(self
            .load()?
            .timeline
            .time_range()
            .map(|(a, b)| (a.to_string(), b.to_string())))
    }

    async fn timeline(&mut self) -> Result<Timeline> {
        Ok(self.load()?.timeline.clone())
    }

    async fn stream(
        &mut self,
        from: Option<String>,
        speed: f64,
    ) -> Result<mpsc::Receiver<TimelineEntry>> {
        let loaded = self.load()?;
        let start = match &from {
            Some(t) => loaded.timeline.find_index(t),
            None => 0,
        };
        Ok(spawn_stream(loaded.timeline.clone(), start, speed))
    }

    async fn close(&mut self) -> Result<()> {
        self.loaded = None;
        Ok(())
    }
}
