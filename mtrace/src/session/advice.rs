//! Session advice
//!
//! The single advice instance shared by every probe of a session. On exit it
//! bumps the shared invocation counter, turns the call context into an
//! [`InvocationEvent`] and queues it. Calls counted past the limit queue
//! nothing, so at most `limit` events ever reach the inbox. The call that
//! brings the counter to the limit queues its event, then
//! [`Signal::LimitReached`].

use mtrace_common::{Advice, CallContext, InboxMessage, InvocationEvent, Signal};
use std::backtrace::Backtrace;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use super::inbox::Inbox;

pub struct SessionAdvice {
    inbox: Arc<Inbox>,
    invocations: AtomicU64,
    limit: Option<u64>,
    capture_threads: bool,
    capture_stacks: bool,
}

impl SessionAdvice {
    #[must_use]
    pub fn new(inbox: Arc<Inbox>, limit: Option<u64>) -> Self {
        Self {
            inbox,
            invocations: AtomicU64::new(0),
            limit,
            capture_threads: false,
            capture_stacks: false,
        }
    }

    /// Record the calling thread's name in each event.
    #[must_use]
    pub fn capture_threads(mut self, enabled: bool) -> Self {
        self.capture_threads = enabled;
        self
    }

    /// Capture the call stack of each invocation. Expensive.
    #[must_use]
    pub fn capture_stacks(mut self, enabled: bool) -> Self {
        self.capture_stacks = enabled;
        self
    }

    /// Completed invocations observed so far.
    #[must_use]
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Acquire)
    }
}

impl Advice for SessionAdvice {
    fn exit_with(&self, ctx: &CallContext<'_>) {
        let count = self.invocations.fetch_add(1, Ordering::AcqRel) + 1;
        if self.limit.is_some_and(|limit| count > limit) {
            return;
        }

        let mut event = InvocationEvent::from_context(ctx);
        if self.capture_threads || self.capture_stacks {
            event = event.with_thread(thread::current().name().map(str::to_owned));
        }
        if self.capture_stacks {
            event = event.with_call_stack(Backtrace::force_capture().to_string());
        }
        self.inbox.offer(InboxMessage::Event(event));
        if self.limit == Some(count) {
            self.inbox.offer(InboxMessage::Signal(Signal::LimitReached));
        }
    }
}
