//! Tracing session modules
//!
//! Everything between "these classes are loaded" and "here is the table":
//! - Class selection by package, class and method patterns
//! - Probe installation and guaranteed removal
//! - The bounded inbox between probed threads and the session loop
//! - The advice that turns completed calls into events
//! - Per-method statistics and periodic reporting
//! - The controller state machine tying it together

pub mod advice;
pub mod controller;
pub mod inbox;
pub mod probes;
pub mod report;
pub mod selector;
pub mod statistic;

// Re-export common types
pub use advice::SessionAdvice;
pub use controller::{CancelHandle, SessionController, SessionReport};
pub use inbox::Inbox;
pub use probes::{install_probes, remove_probes, InstallSummary, ProbeGuard, RemoveSummary};
pub use report::{render_table, ReportSink, StdoutReporter, NO_DATA};
pub use selector::{select_candidates, ClassFilter, Selection, SelectionWarning};
pub use statistic::{MethodKey, Statistic, StatisticRow, StatisticTable};
