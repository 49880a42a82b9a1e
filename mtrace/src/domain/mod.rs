//! Domain model for mtrace
//!
//! Core types shared by the selection, probe and session layers:
//! - Compile-time safety via newtype pattern
//! - Anchored name patterns compiled once per session
//! - Structured error handling

pub mod errors;
pub mod pattern;
pub mod types;

pub use errors::{ConfigError, ExportError, RewriteError, SessionError, SinkError};
pub use pattern::{MethodPattern, NamePattern};
pub use types::{split_class_name, Candidate, SessionState, TerminationCause};
