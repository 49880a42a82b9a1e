//! # Shared Probe Contract (instrumented code ↔ session controller)
//!
//! Defines the types that cross the boundary between probed method bodies,
//! which run on arbitrary application threads, and the single session loop
//! that aggregates their results.
//!
//! ## Key Types
//!
//! - [`CallSite`] - Static identity of one probed method
//! - [`CallContext`] - Per-call view handed to [`Advice`] at entry and exit
//! - [`InvocationEvent`] - Owned record of one completed call, sent to the inbox
//! - [`InboxMessage`] - Everything the session loop can dequeue
//! - [`Advice`] - Hook contract invoked by probes
//! - [`HookCell`] - Per-loader slot swapped between active advice and no-op
//!
//! ## Threading
//!
//! Everything here is `Send + Sync`. The only mutation on the hot path is the
//! atomic swap inside [`HookCell`]; events are built on the calling thread and
//! ownership moves to the consumer when they are queued.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use arc_swap::ArcSwap;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Clock
// ============================================================================

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds elapsed on the process-wide monotonic clock.
///
/// Every timestamp carried by an [`InvocationEvent`] comes from this clock,
/// so timestamps taken on different threads can be compared directly.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn monotonic_nanos() -> u64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

// ============================================================================
// Identification
// ============================================================================

/// Identity of the loader that defined a class.
///
/// Hooks are published per loader: code defined by one loader can only reach
/// the advice published into that loader's [`HookCell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LoaderId(pub u32);

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loader#{}", self.0)
    }
}

/// Static identity of one probed method.
///
/// Created once per method when the probe is attached and shared by every
/// call that goes through it, so building an event only clones two `Arc`s.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSite {
    /// Fully qualified class name (e.g. `shop::orders::OrderService`)
    pub class_name: Arc<str>,
    /// Method name within the class
    pub method_name: Arc<str>,
    /// Loader that defined the class
    pub loader: LoaderId,
}

impl CallSite {
    #[must_use]
    pub fn new(
        class_name: impl Into<Arc<str>>,
        method_name: impl Into<Arc<str>>,
        loader: LoaderId,
    ) -> Self {
        Self { class_name: class_name.into(), method_name: method_name.into(), loader }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.class_name, self.method_name)
    }
}

// ============================================================================
// Per-call data
// ============================================================================

/// How a probed call finished.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(tag = "kind", content = "message", rename_all = "snake_case")
)]
pub enum Outcome {
    /// The body returned normally
    Returned,
    /// The body returned an error or panicked; carries the rendered failure
    Failed(String),
}

impl Outcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// View of one call handed to [`Advice`].
///
/// At entry only `start_ns` is known. At exit `stop_ns` and `outcome` are set.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub site: &'a CallSite,
    pub start_ns: u64,
    pub stop_ns: Option<u64>,
    pub outcome: Option<&'a Outcome>,
}

impl<'a> CallContext<'a> {
    /// Context for the call-entry hook.
    #[must_use]
    pub fn entering(site: &'a CallSite, start_ns: u64) -> Self {
        Self { site, start_ns, stop_ns: None, outcome: None }
    }

    /// Context for the call-exit hook.
    #[must_use]
    pub fn exiting(site: &'a CallSite, start_ns: u64, stop_ns: u64, outcome: &'a Outcome) -> Self {
        Self { site, start_ns, stop_ns: Some(stop_ns), outcome: Some(outcome) }
    }
}

/// Owned record of one completed (or failed) probed call.
///
/// Built by the advice on the calling thread; read-only once queued.
/// Invariant: `stop_ns`, when present, is never before `start_ns`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InvocationEvent {
    pub class_name: Arc<str>,
    pub method_name: Arc<str>,
    pub start_ns: u64,
    pub stop_ns: Option<u64>,
    pub outcome: Outcome,
    /// Name of the thread that executed the call, when captured
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub thread: Option<String>,
    /// Rendered call stack, only present when stack capture is enabled
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub call_stack: Option<String>,
}

impl InvocationEvent {
    /// Build an event from an exit context.
    ///
    /// A missing outcome is treated as a normal return. A stop timestamp that
    /// precedes the start (clock read on a different core) is clamped to start.
    #[must_use]
    pub fn from_context(ctx: &CallContext<'_>) -> Self {
        Self {
            class_name: Arc::clone(&ctx.site.class_name),
            method_name: Arc::clone(&ctx.site.method_name),
            start_ns: ctx.start_ns,
            stop_ns: ctx.stop_ns.map(|stop| stop.max(ctx.start_ns)),
            outcome: ctx.outcome.cloned().unwrap_or(Outcome::Returned),
            thread: None,
            call_stack: None,
        }
    }

    #[must_use]
    pub fn with_thread(mut self, thread: Option<String>) -> Self {
        self.thread = thread;
        self
    }

    #[must_use]
    pub fn with_call_stack(mut self, call_stack: String) -> Self {
        self.call_stack = Some(call_stack);
        self
    }

    /// Elapsed time of the call, `None` while the stop timestamp is absent.
    #[must_use]
    pub fn elapsed_ns(&self) -> Option<u64> {
        self.stop_ns.map(|stop| stop.saturating_sub(self.start_ns))
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.outcome.is_failure()
    }
}

// ============================================================================
// Inbox messages
// ============================================================================

/// Control signals that end a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The shared invocation counter reached the configured limit
    LimitReached,
    /// Early termination requested from outside the session
    Cancel,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::LimitReached => f.write_str("limit reached"),
            Signal::Cancel => f.write_str("cancel"),
        }
    }
}

/// Payload accepted by the session inbox.
///
/// Marked non-exhaustive: consumers must handle payloads they do not know.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum InboxMessage {
    Event(InvocationEvent),
    Signal(Signal),
}

impl InboxMessage {
    #[must_use]
    pub fn is_signal(&self) -> bool {
        matches!(self, InboxMessage::Signal(_))
    }
}

// ============================================================================
// Advice
// ============================================================================

/// Hook invoked by probes around a matched method body.
///
/// Called directly on the thread executing the probed method, possibly from
/// many threads at once. Implementations must not block.
pub trait Advice: Send + Sync {
    /// Called before the original body runs.
    fn enter_with(&self, ctx: &CallContext<'_>) {
        let _ = ctx;
    }

    /// Called after the body returned or failed.
    fn exit_with(&self, ctx: &CallContext<'_>);
}

/// Advice that does nothing. Installed whenever no session is active.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAdvice;

impl Advice for NoopAdvice {
    fn exit_with(&self, _ctx: &CallContext<'_>) {}
}

struct Hook {
    advice: Arc<dyn Advice>,
    active: bool,
}

impl Hook {
    fn noop() -> Self {
        Self { advice: Arc::new(NoopAdvice), active: false }
    }
}

/// The advice reachable from one loader.
///
/// Probes hold an `Arc<HookCell>` and load the current hook on every call.
/// Activating and resetting swap the hook atomically, so a call that is
/// already running keeps the hook it loaded while new calls see the swap.
pub struct HookCell {
    loader: LoaderId,
    current: ArcSwap<Hook>,
}

impl HookCell {
    #[must_use]
    pub fn new(loader: LoaderId) -> Self {
        Self { loader, current: ArcSwap::from_pointee(Hook::noop()) }
    }

    #[must_use]
    pub fn loader(&self) -> LoaderId {
        self.loader
    }

    /// Route calls through `advice` from now on.
    pub fn activate(&self, advice: Arc<dyn Advice>) {
        self.current.store(Arc::new(Hook { advice, active: true }));
    }

    /// Swap back to the no-op advice. Safe to call repeatedly.
    pub fn reset(&self) {
        if self.is_active() {
            self.current.store(Arc::new(Hook::noop()));
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current.load().active
    }

    pub fn enter(&self, ctx: &CallContext<'_>) {
        self.current.load().advice.enter_with(ctx);
    }

    pub fn exit(&self, ctx: &CallContext<'_>) {
        self.current.load().advice.exit_with(ctx);
    }
}

impl fmt::Debug for HookCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookCell")
            .field("loader", &self.loader)
            .field("active", &self.is_active())
            .finish()
    }
}
