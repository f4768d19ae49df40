//! Event Recorder - persists feed events to a JSONL file
//!
//! The EventRecorder consumes a FeedBus subscription and appends every event,
//! timestamped, to a single `.jsonl` file for later replay.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::types::{FeedEvent, FeedEventEntry};

/// Writes feed events to a JSONL file
pub struct EventRecorder {
    path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

impl EventRecorder {
    /// Open (or create) a recording file in append mode
    pub fn create(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(?path, "EventRecorder::create: opening recording");

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of events written by this recorder
    pub fn written(&self) -> usize {
        self.written
    }

    /// Append one event as a JSON line
    pub fn write_event(&mut self, event: &FeedEvent) -> eyre::Result<()> {
        debug!(event_type = event.event_type(), "EventRecorder::write_event");
        let entry = FeedEventEntry::new(event.clone());
        let json = serde_json::to_string(&entry)?;
        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    /// Run the recorder until the bus closes
    ///
    /// This is meant to be spawned as a background task. Subscribe before
    /// spawning so no events are missed.
    pub async fn run(mut self, mut rx: broadcast::Receiver<FeedEvent>) -> usize {
        debug!(path = ?self.path, "EventRecorder::run: starting recorder");

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.write_event(&event) {
                        error!(error = %e, "EventRecorder: failed to write event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "EventRecorder: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventRecorder: channel closed, shutting down");
                    break;
                }
            }
        }

        let _ = self.writer.flush();
        self.written
    }
}

/// Read a recording back
///
/// Lines that fail to parse are skipped with a warning.
pub fn read_recording(path: impl AsRef<Path>) -> eyre::Result<Vec<FeedEventEntry>> {
    let path = path.as_ref();
    debug!(?path, "read_recording: reading file");

    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<FeedEventEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(line, error = %e, "read_recording: failed to parse line");
            }
        }
    }

    debug!(count = entries.len(), "read_recording: loaded entries");
    Ok(entries)
}

/// Spawn a recorder for the given subscription
pub fn spawn_recorder(
    path: impl AsRef<Path>,
    rx: broadcast::Receiver<FeedEvent>,
) -> eyre::Result<tokio::task::JoinHandle<usize>> {
    let recorder = EventRecorder::create(path)?;
    Ok(tokio::spawn(recorder.run(rx)))
}
