//! File-backed result sink.

use fs2::FileExt;
use regflow_core::error::{RegflowError, Result};
use regflow_core::identity::Identity;
use regflow_core::sink::ResultSink;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Appends one email per line to a text file.
///
/// Writers inside the process are serialized by a mutex; other processes
/// appending to the same file are kept out by an exclusive `fs2` lock held
/// for the duration of the write.
#[derive(Debug)]
pub struct FileResultSink {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileResultSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for FileResultSink {
    fn record(&self, identity: &Identity) -> Result<()> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| RegflowError::io("result sink mutex poisoned"))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()
            .map_err(|e| RegflowError::io(format!("Failed to lock {:?}: {}", self.path, e)))?;

        let written = writeln!(file, "{}", identity.email).and_then(|_| file.flush());
        let _ = FileExt::unlock(&file);
        written?;

        tracing::info!(email = %identity.email, "Recorded completed identity");
        Ok(())
    }
}
