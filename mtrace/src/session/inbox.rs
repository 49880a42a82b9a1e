//! Session inbox
//!
//! Multi-producer queue between probed call sites and the session loop.
//! Producers never block: when the event queue is full the oldest queued
//! event is evicted to make room. Control signals travel on their own
//! channel, are never evicted, and are received ahead of queued events.

use crossbeam_channel::{select_biased, Receiver, Sender, TrySendError};
use mtrace_common::{InboxMessage, Signal};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

pub struct Inbox {
    events_tx: Sender<InboxMessage>,
    events_rx: Receiver<InboxMessage>,
    signals_tx: Sender<Signal>,
    signals_rx: Receiver<Signal>,
    /// Events discarded because the queue was full
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl Inbox {
    /// An inbox holding at most `capacity` events.
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::bounded(capacity);
        let (signals_tx, signals_rx) = crossbeam_channel::unbounded();
        Self {
            events_tx,
            events_rx,
            signals_tx,
            signals_rx,
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Queue a message without blocking.
    ///
    /// Messages offered after [`Inbox::close`] are discarded.
    pub fn offer(&self, message: InboxMessage) {
        if self.is_closed() {
            return;
        }

        let mut message = match message {
            InboxMessage::Signal(signal) => {
                // Fails only once `self.signals_rx` is dropped
                let _ = self.signals_tx.send(signal);
                return;
            }
            other => other,
        };
        loop {
            match self.events_tx.try_send(message) {
                // Disconnected is unreachable while `self.events_rx` is alive
                Ok(()) | Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(rejected)) => {
                    message = rejected;
                    // Empty means the consumer drained the queue meanwhile
                    if self.events_rx.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    /// Wait up to `timeout` for the next message. Pending signals are
    /// returned before any queued event.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<InboxMessage> {
        select_biased! {
            recv(self.signals_rx) -> signal => signal.ok().map(InboxMessage::Signal),
            recv(self.events_rx) -> message => message.ok(),
            default(timeout) => None,
        }
    }

    /// Take the next queued event without waiting, ignoring signals.
    #[must_use]
    pub fn try_recv_event(&self) -> Option<InboxMessage> {
        self.events_rx.try_recv().ok()
    }

    /// Stop accepting messages. Late producers return immediately.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queued events and signals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events_rx.len() + self.signals_rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
