//! # Session Controller
//!
//! Runs one tracing session end to end:
//!
//! ```text
//! Idle ──select──▶ Probing ──install──▶ Collecting ──limit/cancel/timeout──▶ Draining ──remove──▶ Done
//!   │
//!   └── no matched class ──▶ Done (nothing installed)
//! ```
//!
//! The collecting loop is the only code that touches the statistics table.
//! It waits on the inbox for at most one poll interval, so the report and
//! timeout timers are re-checked even when no events arrive. Signals are
//! received ahead of queued events; on the limit signal the events still
//! queued are folded in before draining. They were all counted within the
//! limit, so a session never records more than `limit` events.

use log::{debug, error, info, warn};
use mtrace_common::{Advice, InboxMessage, Signal};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::advice::SessionAdvice;
use super::inbox::Inbox;
use super::probes::{install_probes, InstallSummary, ProbeGuard, RemoveSummary};
use super::report::{ReportSink, StdoutReporter};
use super::selector::{select_candidates, ClassFilter};
use super::statistic::{StatisticRow, StatisticTable};
use crate::config::SessionConfig;
use crate::domain::{SessionError, SessionState, TerminationCause};
use crate::runtime::Host;
use crate::sinks::SinkSet;

/// Requests early termination of a running session. Cheap to clone and
/// usable from any thread.
#[derive(Clone)]
pub struct CancelHandle {
    inbox: Arc<Inbox>,
}

impl CancelHandle {
    /// Observed at the session loop's next receive; not preemptive.
    pub fn cancel(&self) {
        self.inbox.offer(InboxMessage::Signal(Signal::Cancel));
    }
}

/// Outcome of a finished session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub cause: TerminationCause,
    pub elapsed_secs: f64,
    /// Events dequeued by the session loop
    pub events: u64,
    /// Events discarded by inbox backpressure
    pub dropped: u64,
    pub candidates: usize,
    pub installed: usize,
    pub install_failures: usize,
    pub remove_failures: usize,
    pub rows: Vec<StatisticRow>,
}

pub struct SessionController<H: Host> {
    host: Arc<H>,
    config: SessionConfig,
    filter: ClassFilter,
    inbox: Arc<Inbox>,
    reporter: Box<dyn ReportSink>,
    state: SessionState,
}

impl<H: Host> SessionController<H> {
    /// # Errors
    /// Returns [`SessionError::Config`] if the configuration is invalid.
    pub fn new(host: Arc<H>, config: SessionConfig) -> Result<Self, SessionError> {
        let filter = config.validate()?;
        let inbox = Arc::new(Inbox::bounded(config.inbox_capacity));
        Ok(Self {
            host,
            config,
            filter,
            inbox,
            reporter: Box::new(StdoutReporter),
            state: SessionState::Idle,
        })
    }

    /// Replace the stdout table printer.
    #[must_use]
    pub fn with_reporter(mut self, reporter: impl ReportSink + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle { inbox: Arc::clone(&self.inbox) }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion.
    ///
    /// Per-class probe failures and unknown inbox messages are logged, never
    /// returned. The only error is a setup failure before any probe exists.
    ///
    /// # Errors
    /// Returns [`SessionError::Sink`] if the output directory cannot be created.
    pub fn run(mut self) -> Result<SessionReport, SessionError> {
        let started = Instant::now();
        let host = Arc::clone(&self.host);

        let selection = select_candidates(&*host, &self.filter);
        let candidates = selection.candidates;
        if candidates.is_empty() {
            warn!("no matched class ({})", self.filter);
            self.inbox.close();
            self.transition(SessionState::Done);
            return Ok(self.report(
                TerminationCause::NoMatchedClass,
                started.elapsed(),
                0,
                0,
                InstallSummary::default(),
                RemoveSummary::default(),
                &StatisticTable::default(),
            ));
        }

        let mut sinks = SinkSet::prepare(&self.config)?;

        self.transition(SessionState::Probing);
        let advice: Arc<dyn Advice> = Arc::new(
            SessionAdvice::new(Arc::clone(&self.inbox), self.config.limit)
                .capture_threads(self.config.detail)
                .capture_stacks(self.config.stack),
        );
        let mut guard = ProbeGuard::new(&*host, &candidates);
        let install = install_probes(&*host, &candidates, &advice);

        self.transition(SessionState::Collecting);
        let mut table = StatisticTable::seed(&candidates);
        let (cause, events) = self.collect(&mut table, &mut sinks, started);

        self.transition(SessionState::Draining);
        info!("Draining session: {cause}");
        self.inbox.close();
        sinks.close();
        self.reporter.report(&table, true);
        let removal = guard.remove().unwrap_or_default();

        self.transition(SessionState::Done);
        let report = self.report(
            cause,
            started.elapsed(),
            events,
            candidates.len(),
            install,
            removal,
            &table,
        );
        info!(
            "session ended: {} after {:.1}s, {} events ({} dropped), {}/{} classes probed",
            report.cause,
            report.elapsed_secs,
            report.events,
            report.dropped,
            report.installed,
            report.candidates
        );
        Ok(report)
    }

    fn collect(
        &mut self,
        table: &mut StatisticTable,
        sinks: &mut SinkSet,
        started: Instant,
    ) -> (TerminationCause, u64) {
        let mut events = 0;
        let mut last_report = Instant::now();

        loop {
            if let Some(message) = self.inbox.recv_timeout(self.config.poll_interval) {
                match message {
                    InboxMessage::Event(event) => {
                        events += 1;
                        table.record(&event);
                        sinks.write(&event);
                    }
                    InboxMessage::Signal(Signal::LimitReached) => {
                        events += self.fold_queued(table, sinks);
                        return (TerminationCause::Limit, events);
                    }
                    InboxMessage::Signal(Signal::Cancel) => {
                        return (TerminationCause::Cancel, events);
                    }
                    other => {
                        error!("Unrecognized inbox message: {other:?}");
                    }
                }
            }

            if last_report.elapsed() >= self.config.report_interval {
                self.reporter.report(table, false);
                last_report = Instant::now();
            }

            if self.config.timeout.is_some_and(|timeout| started.elapsed() >= timeout) {
                return (TerminationCause::Timeout, events);
            }
        }
    }

    /// Record every event already queued, without waiting.
    fn fold_queued(&self, table: &mut StatisticTable, sinks: &mut SinkSet) -> u64 {
        let mut folded = 0;
        while let Some(message) = self.inbox.try_recv_event() {
            if let InboxMessage::Event(event) = message {
                folded += 1;
                table.record(&event);
                sinks.write(&event);
            }
        }
        folded
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session state {:?} -> {next:?}", self.state);
        self.state = next;
    }

    #[allow(clippy::too_many_arguments)]
    fn report(
        &self,
        cause: TerminationCause,
        elapsed: Duration,
        events: u64,
        candidates: usize,
        install: InstallSummary,
        removal: RemoveSummary,
        table: &StatisticTable,
    ) -> SessionReport {
        SessionReport {
            cause,
            elapsed_secs: elapsed.as_secs_f64(),
            events,
            dropped: self.inbox.dropped(),
            candidates,
            installed: install.installed,
            install_failures: install.failures,
            remove_failures: removal.failures,
            rows: table.snapshot(),
        }
    }
}
