//! Newtypes and small enums for the session domain.

use mtrace_common::LoaderId;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Separator between path segments of a class name.
pub const PATH_SEPARATOR: &str = "::";

/// Split a fully qualified class name into `(package, simple_name)`.
///
/// `shop::orders::OrderService` → (`shop::orders`, `OrderService`).
/// A top-level name has an empty package.
#[must_use]
pub fn split_class_name(name: &str) -> (&str, &str) {
    name.rsplit_once(PATH_SEPARATOR).unwrap_or(("", name))
}

/// A class selected for tracing in the current session.
///
/// Computed once at session start; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Fully qualified class name
    pub name: Arc<str>,
    /// Loader that defined the class
    pub loader: LoaderId,
    /// Methods matched by the method pattern, in declaration order
    pub methods: Vec<Arc<str>>,
}

impl Candidate {
    #[must_use]
    pub fn has_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| &**m == method)
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.loader)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationCause {
    /// The invocation counter reached the configured limit
    Limit,
    /// The session timeout elapsed
    Timeout,
    /// `cancel()` was requested
    Cancel,
    /// No loaded class matched the filters; nothing was probed
    NoMatchedClass,
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TerminationCause::Limit => "limit",
            TerminationCause::Timeout => "timeout",
            TerminationCause::Cancel => "cancel",
            TerminationCause::NoMatchedClass => "no matched class",
        })
    }
}

/// Lifecycle of a session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Probing,
    Collecting,
    Draining,
    Done,
}
