//! # Detail and Stack Sinks
//!
//! Optional append-only logs written by the session loop:
//!
//! - `detail.log` - one JSON record per invocation
//! - `stack.log` - one JSON record per invocation that carries a call stack
//!
//! Both live under `<output_root>/<pid>/`. The directory is created when the
//! session starts; files are opened on first write and closed once at drain.

use mtrace_common::{InvocationEvent, Outcome};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::SessionConfig;
use crate::domain::SinkError;

pub mod jsonl;

pub use jsonl::JsonLinesSink;

pub const DETAIL_FILE: &str = "detail.log";
pub const STACK_FILE: &str = "stack.log";

/// Per-process working directory under `root`.
#[must_use]
pub fn process_dir(root: &Path) -> PathBuf {
    root.join(std::process::id().to_string())
}

#[derive(Serialize)]
struct DetailRecord<'a> {
    class_name: &'a str,
    method_name: &'a str,
    start_ns: u64,
    stop_ns: Option<u64>,
    elapsed_ns: Option<u64>,
    outcome: &'a Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread: Option<&'a str>,
}

#[derive(Serialize)]
struct StackRecord<'a> {
    class_name: &'a str,
    method_name: &'a str,
    start_ns: u64,
    thread: Option<&'a str>,
    stack: &'a str,
}

/// The sinks enabled for one session.
#[derive(Debug, Default)]
pub struct SinkSet {
    detail: Option<JsonLinesSink>,
    stack: Option<JsonLinesSink>,
}

impl SinkSet {
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Create the per-process directory if any sink is enabled.
    ///
    /// # Errors
    /// Returns [`SinkError::CreateDir`] if the directory cannot be created.
    pub fn prepare(config: &SessionConfig) -> Result<Self, SinkError> {
        if !config.sinks_enabled() {
            return Ok(Self::disabled());
        }

        let dir = process_dir(&config.output_root);
        fs::create_dir_all(&dir)
            .map_err(|source| SinkError::CreateDir { path: dir.clone(), source })?;

        Ok(Self {
            detail: config.detail.then(|| JsonLinesSink::new(dir.join(DETAIL_FILE))),
            stack: config.stack.then(|| JsonLinesSink::new(dir.join(STACK_FILE))),
        })
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.detail.is_some() || self.stack.is_some()
    }

    pub fn write(&mut self, event: &InvocationEvent) {
        if let Some(detail) = self.detail.as_mut() {
            detail.write(&DetailRecord {
                class_name: &event.class_name,
                method_name: &event.method_name,
                start_ns: event.start_ns,
                stop_ns: event.stop_ns,
                elapsed_ns: event.elapsed_ns(),
                outcome: &event.outcome,
                thread: event.thread.as_deref(),
            });
        }

        if let (Some(sink), Some(stack)) = (self.stack.as_mut(), event.call_stack.as_deref()) {
            sink.write(&StackRecord {
                class_name: &event.class_name,
                method_name: &event.method_name,
                start_ns: event.start_ns,
                thread: event.thread.as_deref(),
                stack,
            });
        }
    }

    /// Flush and close every open sink. Later calls do nothing.
    pub fn close(&mut self) {
        for sink in [self.detail.as_mut(), self.stack.as_mut()].into_iter().flatten() {
            sink.close();
        }
    }
}
