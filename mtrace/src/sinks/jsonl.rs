//! Lazily opened JSON-lines writer.

use log::{debug, warn};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::domain::SinkError;

#[derive(Debug)]
enum State {
    Pending,
    Open(BufWriter<File>),
    /// Closed at drain, or disabled after a write failure
    Closed,
}

/// Append-only file of one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    state: State,
    written: u64,
}

impl JsonLinesSink {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path, state: State::Pending, written: 0 }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Append one record. The first failure is logged and disables the sink.
    pub fn write<T: Serialize>(&mut self, record: &T) {
        if matches!(self.state, State::Closed) {
            return;
        }
        if let Err(e) = self.try_write(record) {
            warn!("⚠️  Disabling sink {}: {e}", self.path.display());
            self.state = State::Closed;
        }
    }

    fn try_write<T: Serialize>(&mut self, record: &T) -> Result<(), SinkError> {
        if matches!(self.state, State::Pending) {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|source| SinkError::Open { path: self.path.clone(), source })?;
            debug!("Opened sink {}", self.path.display());
            self.state = State::Open(BufWriter::new(file));
        }

        if let State::Open(writer) = &mut self.state {
            serde_json::to_writer(&mut *writer, record)?;
            writer.write_all(b"\n")?;
            self.written += 1;
        }
        Ok(())
    }

    /// Flush and close. Safe to call repeatedly or before anything was written.
    pub fn close(&mut self) {
        if let State::Open(mut writer) = std::mem::replace(&mut self.state, State::Closed) {
            if let Err(e) = writer.flush() {
                warn!("⚠️  Failed to flush {}: {e}", self.path.display());
            }
            debug!("Closed sink {} ({} records)", self.path.display(), self.written);
        }
    }
}

impl Drop for JsonLinesSink {
    fn drop(&mut self) {
        self.close();
    }
}
