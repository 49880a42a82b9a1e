//! Structured error types for mtrace
//!
//! Using thiserror for automatic Display implementation and error chaining.

use mtrace_common::LoaderId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {kind} pattern '{pattern}': {source}")]
    InvalidPattern {
        kind: &'static str,
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },

    #[error("At least one method pattern is required")]
    EmptyMethodPattern,

    #[error("Invalid {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

/// Failure of the host's class rewrite or hook publication for one class.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewriteError {
    #[error("Class {0} is no longer loaded")]
    ClassNotLoaded(String),

    #[error("Class {0} cannot be redefined")]
    Unmodifiable(String),

    #[error("{loader} rejected the hook: {reason}")]
    HookRejected { loader: LoaderId, reason: String },

    #[error("Failed to redefine {class}: {reason}")]
    RedefineFailed { class: String, reason: String },
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to create output directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Errors that abort a session before it starts collecting.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write statistics file {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
