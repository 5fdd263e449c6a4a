//! Append-only JSONL sinks under the session's output directory.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Directory name for on-disk outputs, created in the project root.
pub const OUTPUT_DIR: &str = ".weft";

/// Current Unix time in seconds.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// RFC 3339 timestamp for log records.
pub fn rfc3339_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// One append-only `*.jsonl` file.  The file is opened lazily on first
/// append so a session that never emits a record leaves nothing behind.
pub struct JsonlWriter {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl JsonlWriter {
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            path: dir.join(name),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize `record` and append it as one line.
    pub fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        let mut guard = self.file.lock().expect("jsonl writer lock poisoned");
        if guard.is_none() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .with_context(|| format!("opening {}", self.path.display()))?;
            *guard = Some(file);
        }
        let file = guard.as_mut().expect("file is Some after the fill above");
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}
