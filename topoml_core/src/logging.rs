//! JSON line-delimited training log.
//!
//! Each run writes to `<log_dir>/<signature>/training.jsonl`; one line per
//! bucket fit or epoch.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

fn append_json_line<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    serde_json::to_writer(&mut file, value)
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    file.write_all(b"\n")
}

fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// One fit of the classifier on a bucket (or, for fixed-length data, one epoch).
#[derive(Debug, Clone, Serialize)]
pub struct TrainingLogEntry {
    pub epoch: usize,
    pub total_epochs: usize,
    /// Sequence length of the bucket, absent for fixed-length training
    pub bucket: Option<usize>,
    pub entries: usize,
    pub loss: f32,
    pub accuracy: f32,
    pub val_loss: Option<f32>,
    pub val_accuracy: Option<f32>,
    pub timestamp_ms: u128,
}

impl TrainingLogEntry {
    pub fn new(epoch: usize, total_epochs: usize, bucket: Option<usize>, entries: usize) -> Self {
        Self {
            epoch,
            total_epochs,
            bucket,
            entries,
            loss: 0.0,
            accuracy: 0.0,
            val_loss: None,
            val_accuracy: None,
            timestamp_ms: timestamp_ms(),
        }
    }
}

/// Appends training entries to a per-run JSONL file.
#[derive(Debug, Clone)]
pub struct TrainingLogger {
    path: Option<PathBuf>,
}

impl TrainingLogger {
    /// Logger writing to `<log_dir>/<signature>/training.jsonl`.
    pub fn create<P: AsRef<Path>>(log_dir: P, signature: &str) -> io::Result<Self> {
        let dir = log_dir.as_ref().join(signature);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            path: Some(dir.join("training.jsonl")),
        })
    }

    /// Logger that drops every entry.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn log(&self, entry: &TrainingLogEntry) -> io::Result<()> {
        match &self.path {
            Some(path) => append_json_line(path, entry),
            None => Ok(()),
        }
    }
}
