use mtrace::config::SessionConfig;
use mtrace::domain::{Candidate, RewriteError, SessionError, TerminationCause};
use mtrace::runtime::{
    ClassHandle, ClassInfo, ClassRegistry, CodeRewriter, HookLoader, InProcessRuntime,
};
use mtrace::session::{render_table, ReportSink, SessionController, StatisticTable, NO_DATA};
use mtrace::sinks::{process_dir, DETAIL_FILE, STACK_FILE};
use mtrace_common::{Advice, HookCell, LoaderId};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const POLL: Duration = Duration::from_millis(20);

/// Calls `method` in a loop until stopped; every `fail_every`-th call fails.
fn spawn_producer(
    class: ClassHandle,
    method: &'static str,
    pause: Duration,
    fail_every: u64,
    stop: &Arc<AtomicBool>,
) -> JoinHandle<u64> {
    let stop = Arc::clone(stop);
    thread::spawn(move || {
        let mut calls = 0_u64;
        while !stop.load(Ordering::Relaxed) {
            calls += 1;
            let _ = class.invoke(method, || {
                thread::sleep(Duration::from_micros(50));
                if fail_every > 0 && calls % fail_every == 0 {
                    Err(format!("call {calls} failed"))
                } else {
                    Ok(())
                }
            });
            thread::sleep(pause);
        }
        calls
    })
}

/// Calls `method` back to back with an empty body until stopped.
fn spawn_spinner(
    class: ClassHandle,
    method: &'static str,
    stop: &Arc<AtomicBool>,
) -> JoinHandle<u64> {
    let stop = Arc::clone(stop);
    thread::spawn(move || {
        let mut calls = 0_u64;
        while !stop.load(Ordering::Relaxed) {
            calls += 1;
            class.call(method, || ());
        }
        calls
    })
}

fn stop_all(stop: &AtomicBool, producers: Vec<JoinHandle<u64>>) -> u64 {
    stop.store(true, Ordering::Relaxed);
    producers.into_iter().map(|p| p.join().expect("producer panicked")).sum()
}

#[derive(Clone, Default)]
struct CapturingReporter {
    reports: Arc<Mutex<Vec<(bool, String)>>>,
}

impl ReportSink for CapturingReporter {
    fn report(&mut self, table: &StatisticTable, final_report: bool) {
        self.reports.lock().unwrap().push((final_report, render_table(table)));
    }
}

#[test]
fn test_empty_selection_installs_nothing() {
    let runtime = Arc::new(InProcessRuntime::new());
    let cart = runtime.define_class("shop::Cart", LoaderId(1), &["add"]);
    let config = SessionConfig::new("Nothing").with_timeout(Duration::from_secs(5));

    let report = SessionController::new(runtime, config)
        .unwrap()
        .with_reporter(CapturingReporter::default())
        .run()
        .unwrap();

    assert_eq!(report.cause, TerminationCause::NoMatchedClass);
    assert_eq!(report.installed, 0);
    assert!(report.rows.is_empty());
    assert!(report.elapsed_secs < 1.0, "empty session should end immediately");
    assert!(!cart.is_probed("add"));
}

#[test]
fn test_methods_without_traffic_reported_with_sentinel() {
    let runtime = Arc::new(InProcessRuntime::new());
    runtime.define_class("A", LoaderId(1), &["foo", "bar"]);
    let reporter = CapturingReporter::default();
    let config = SessionConfig::new("A")
        .with_poll_interval(POLL)
        .with_report_interval(Duration::from_millis(50))
        .with_timeout(Duration::from_millis(250));

    let report = SessionController::new(runtime, config)
        .unwrap()
        .with_reporter(reporter.clone())
        .run()
        .unwrap();

    assert_eq!(report.cause, TerminationCause::Timeout);
    let reports = reporter.reports.lock().unwrap();
    let periodic = reports.iter().filter(|(final_report, _)| !final_report).count();
    let finals: Vec<&String> = reports.iter().filter(|(f, _)| *f).map(|(_, text)| text).collect();
    assert!(periodic >= 2, "expected periodic reports, got {periodic}");
    assert_eq!(finals.len(), 1);

    let rows: Vec<&str> = finals[0].lines().skip(1).collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].starts_with("A::bar") && rows[0].contains(NO_DATA));
    assert!(rows[1].starts_with("A::foo") && rows[1].contains(NO_DATA));
}

#[test]
fn test_limit_ends_session_at_exact_count() {
    let runtime = Arc::new(InProcessRuntime::new());
    let a = runtime.define_class("A", LoaderId(1), &["foo"]);
    let config = SessionConfig::new("A")
        .with_limit(50)
        .with_poll_interval(POLL)
        .with_timeout(Duration::from_secs(10));
    let controller = SessionController::new(Arc::clone(&runtime), config)
        .unwrap()
        .with_reporter(CapturingReporter::default());

    let stop = Arc::new(AtomicBool::new(false));
    let producers = vec![spawn_producer(a.clone(), "foo", Duration::from_micros(100), 0, &stop)];
    let report = controller.run().unwrap();
    stop_all(&stop, producers);

    assert_eq!(report.cause, TerminationCause::Limit);
    assert_eq!(report.dropped, 0);
    assert_eq!(report.events, 50);
    assert_eq!(report.rows[0].total, 50);
    assert!(!a.is_probed("foo"));
}

#[test]
fn test_limit_holds_with_many_spinning_producers() {
    let runtime = Arc::new(InProcessRuntime::new());
    let a = runtime.define_class("A", LoaderId(1), &["foo"]);
    let config = SessionConfig::new("A")
        .with_limit(1000)
        .with_poll_interval(POLL)
        .with_timeout(Duration::from_secs(10));
    let controller = SessionController::new(Arc::clone(&runtime), config)
        .unwrap()
        .with_reporter(CapturingReporter::default());

    let stop = Arc::new(AtomicBool::new(false));
    let producers: Vec<_> = (0..8).map(|_| spawn_spinner(a.clone(), "foo", &stop)).collect();
    let report = controller.run().unwrap();
    let calls = stop_all(&stop, producers);

    assert_eq!(report.cause, TerminationCause::Limit);
    assert!(calls >= 1000);
    assert!(report.events + report.dropped <= 1000, "recorded {}", report.events);
    assert_eq!(report.rows[0].total, report.events);
    assert!(!a.is_probed("foo"));
}

#[test]
fn test_limit_holds_when_inbox_saturated() {
    let runtime = Arc::new(InProcessRuntime::new());
    let a = runtime.define_class("A", LoaderId(1), &["foo"]);
    let config = SessionConfig::new("A")
        .with_limit(1000)
        .with_inbox_capacity(16)
        .with_poll_interval(POLL)
        .with_timeout(Duration::from_secs(10));
    let controller = SessionController::new(Arc::clone(&runtime), config)
        .unwrap()
        .with_reporter(CapturingReporter::default());

    let stop = Arc::new(AtomicBool::new(false));
    let producers: Vec<_> = (0..8).map(|_| spawn_spinner(a.clone(), "foo", &stop)).collect();
    let report = controller.run().unwrap();
    stop_all(&stop, producers);

    assert_eq!(report.cause, TerminationCause::Limit);
    assert!(report.events <= 1000, "recorded {}", report.events);
    assert!(report.events + report.dropped <= 1000);
    assert_eq!(report.rows[0].total, report.events);
    assert!(!a.is_probed("foo"));
}

#[test]
fn test_cancel_seen_ahead_of_saturated_inbox() {
    let runtime = Arc::new(InProcessRuntime::new());
    let a = runtime.define_class("A", LoaderId(1), &["foo"]);
    let config = SessionConfig::new("A")
        .with_inbox_capacity(16)
        .with_poll_interval(POLL)
        .with_timeout(Duration::from_secs(10));
    let controller = SessionController::new(Arc::clone(&runtime), config)
        .unwrap()
        .with_reporter(CapturingReporter::default());
    let cancel = controller.cancel_handle();

    let stop = Arc::new(AtomicBool::new(false));
    let producers: Vec<_> = (0..8).map(|_| spawn_spinner(a.clone(), "foo", &stop)).collect();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        cancel.cancel();
    });
    let report = controller.run().unwrap();
    canceller.join().unwrap();
    stop_all(&stop, producers);

    assert_eq!(report.cause, TerminationCause::Cancel);
    assert!(report.elapsed_secs < 5.0, "cancel took {}s", report.elapsed_secs);
    assert!(!a.is_probed("foo"));
}

#[test]
fn test_timeout_with_trickle_under_limit() {
    let runtime = Arc::new(InProcessRuntime::new());
    let a = runtime.define_class("A", LoaderId(1), &["foo"]);
    let config = SessionConfig::new("A")
        .with_limit(100_000)
        .with_poll_interval(Duration::from_millis(50))
        .with_timeout(Duration::from_millis(300));
    let controller = SessionController::new(Arc::clone(&runtime), config)
        .unwrap()
        .with_reporter(CapturingReporter::default());

    let stop = Arc::new(AtomicBool::new(false));
    let producers = vec![spawn_producer(a.clone(), "foo", Duration::from_millis(5), 0, &stop)];
    let report = controller.run().unwrap();
    stop_all(&stop, producers);

    assert_eq!(report.cause, TerminationCause::Timeout);
    assert!(report.elapsed_secs >= 0.3);
    assert!(report.elapsed_secs < 1.5, "timeout overshot: {}s", report.elapsed_secs);
    assert!(report.events > 0);
    assert!(!a.is_probed("foo"));
}

#[test]
fn test_cancel_under_load_removes_probes_and_flushes_sinks() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(InProcessRuntime::new());
    let orders = runtime.define_class("shop::Orders", LoaderId(1), &["place", "cancel"]);
    let prices = runtime.define_class("shop::Prices", LoaderId(2), &["lookup"]);
    let config = SessionConfig::new(".*")
        .with_package("shop")
        .with_poll_interval(POLL)
        .with_detail(true)
        .with_stack(true)
        .with_output_root(dir.path());
    let controller = SessionController::new(Arc::clone(&runtime), config)
        .unwrap()
        .with_reporter(CapturingReporter::default());
    let cancel = controller.cancel_handle();

    let stop = Arc::new(AtomicBool::new(false));
    let producers = vec![
        spawn_producer(orders.clone(), "place", Duration::from_micros(200), 4, &stop),
        spawn_producer(orders.clone(), "cancel", Duration::from_micros(200), 0, &stop),
        spawn_producer(prices.clone(), "lookup", Duration::from_micros(200), 0, &stop),
        spawn_producer(prices.clone(), "lookup", Duration::from_micros(200), 0, &stop),
    ];
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        cancel.cancel();
    });

    let report = controller.run().unwrap();
    canceller.join().unwrap();
    stop_all(&stop, producers);

    assert_eq!(report.cause, TerminationCause::Cancel);
    assert_eq!(report.installed, 2);
    assert_eq!(report.remove_failures, 0);
    assert!(report.events > 0);
    for (class, method) in [(&orders, "place"), (&orders, "cancel"), (&prices, "lookup")] {
        assert!(!class.is_probed(method), "{method} still probed");
    }

    let logs = process_dir(dir.path());
    let detail = std::fs::read_to_string(logs.join(DETAIL_FILE)).unwrap();
    let stack = std::fs::read_to_string(logs.join(STACK_FILE)).unwrap();
    assert_eq!(detail.lines().count() as u64, report.events);
    assert_eq!(stack.lines().count() as u64, report.events);
    for line in detail.lines() {
        let record: serde_json::Value = serde_json::from_str(line).expect("detail line is JSON");
        assert!(record["class_name"].as_str().unwrap().starts_with("shop::"));
        assert!(record["elapsed_ns"].is_u64());
    }
}

/// Delegates to the in-process runtime but refuses to redefine one class.
struct FlakyHost {
    inner: InProcessRuntime,
    broken: &'static str,
}

impl ClassRegistry for FlakyHost {
    fn loaded_classes(&self) -> Vec<ClassInfo> {
        self.inner.loaded_classes()
    }
}

impl HookLoader for FlakyHost {
    fn publish(
        &self,
        loader: LoaderId,
        advice: Arc<dyn Advice>,
    ) -> Result<Arc<HookCell>, RewriteError> {
        self.inner.publish(loader, advice)
    }

    fn retract(&self, loader: LoaderId) {
        self.inner.retract(loader);
    }
}

impl CodeRewriter for FlakyHost {
    fn rewrite(&self, candidate: &Candidate, hook: &Arc<HookCell>) -> Result<usize, RewriteError> {
        if &*candidate.name == self.broken {
            return Err(RewriteError::RedefineFailed {
                class: candidate.name.to_string(),
                reason: "verifier rejected class".to_string(),
            });
        }
        self.inner.rewrite(candidate, hook)
    }

    fn restore(&self, candidate: &Candidate) -> Result<(), RewriteError> {
        self.inner.restore(candidate)
    }
}

#[test]
fn test_partial_install_failure_keeps_session_running() {
    let inner = InProcessRuntime::new();
    let cart = inner.define_class("shop::Cart", LoaderId(1), &["add"]);
    let ledger = inner.define_class("shop::Ledger", LoaderId(1), &["post"]);
    let host = Arc::new(FlakyHost { inner, broken: "shop::Ledger" });
    let config = SessionConfig::new(".*").with_poll_interval(POLL).with_limit(10);
    let controller = SessionController::new(Arc::clone(&host), config)
        .unwrap()
        .with_reporter(CapturingReporter::default());

    let stop = Arc::new(AtomicBool::new(false));
    let producers = vec![
        spawn_producer(cart.clone(), "add", Duration::from_micros(100), 0, &stop),
        spawn_producer(ledger.clone(), "post", Duration::from_micros(100), 0, &stop),
    ];
    let report = controller.run().unwrap();
    stop_all(&stop, producers);

    assert_eq!(report.cause, TerminationCause::Limit);
    assert_eq!(report.candidates, 2);
    assert_eq!(report.installed, 1);
    assert_eq!(report.install_failures, 1);
    let ledger_row = report.rows.iter().find(|row| row.class_name == "shop::Ledger").unwrap();
    assert_eq!(ledger_row.total, 0);
    assert!(!cart.is_probed("add"));
}

/// Delegates to the in-process runtime but panics on the second rewrite.
struct PanickyHost {
    inner: InProcessRuntime,
    rewrites: AtomicUsize,
}

impl ClassRegistry for PanickyHost {
    fn loaded_classes(&self) -> Vec<ClassInfo> {
        self.inner.loaded_classes()
    }
}

impl HookLoader for PanickyHost {
    fn publish(
        &self,
        loader: LoaderId,
        advice: Arc<dyn Advice>,
    ) -> Result<Arc<HookCell>, RewriteError> {
        self.inner.publish(loader, advice)
    }

    fn retract(&self, loader: LoaderId) {
        self.inner.retract(loader);
    }
}

impl CodeRewriter for PanickyHost {
    fn rewrite(&self, candidate: &Candidate, hook: &Arc<HookCell>) -> Result<usize, RewriteError> {
        if self.rewrites.fetch_add(1, Ordering::SeqCst) == 1 {
            panic!("rewriter crashed on {}", candidate.name);
        }
        self.inner.rewrite(candidate, hook)
    }

    fn restore(&self, candidate: &Candidate) -> Result<(), RewriteError> {
        self.inner.restore(candidate)
    }
}

#[test]
fn test_rewrite_panic_restores_classes_already_probed() {
    let inner = InProcessRuntime::new();
    let cart = inner.define_class("shop::Cart", LoaderId(1), &["add"]);
    let ledger = inner.define_class("shop::Ledger", LoaderId(1), &["post"]);
    let host = Arc::new(PanickyHost { inner, rewrites: AtomicUsize::new(0) });
    let config = SessionConfig::new(".*").with_poll_interval(POLL);
    let controller = SessionController::new(Arc::clone(&host), config)
        .unwrap()
        .with_reporter(CapturingReporter::default());

    let result = panic::catch_unwind(AssertUnwindSafe(|| controller.run()));

    assert!(result.is_err());
    assert_eq!(host.rewrites.load(Ordering::SeqCst), 2);
    assert!(!cart.is_probed("add"));
    assert!(!ledger.is_probed("post"));
}

#[test]
fn test_sealed_class_is_not_a_candidate() {
    let runtime = Arc::new(InProcessRuntime::new());
    runtime.define_class("shop::Cart", LoaderId(1), &["add"]);
    let invoice = runtime.define_sealed_class("shop::Invoice", LoaderId(1), &["render"]);
    let config =
        SessionConfig::new(".*").with_poll_interval(POLL).with_timeout(Duration::from_millis(60));

    let report = SessionController::new(runtime, config)
        .unwrap()
        .with_reporter(CapturingReporter::default())
        .run()
        .unwrap();

    assert_eq!(report.candidates, 1);
    assert_eq!(report.rows.len(), 1);
    assert!(!invoice.is_probed("render"));
}

#[test]
fn test_class_unloaded_mid_session_counts_as_remove_failure() {
    let runtime = Arc::new(InProcessRuntime::new());
    runtime.define_class("A", LoaderId(1), &["foo"]);
    runtime.define_class("B", LoaderId(1), &["bar"]);
    let config =
        SessionConfig::new(".*").with_poll_interval(POLL).with_timeout(Duration::from_millis(200));
    let controller = SessionController::new(Arc::clone(&runtime), config)
        .unwrap()
        .with_reporter(CapturingReporter::default());

    let unloader = {
        let runtime = Arc::clone(&runtime);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            runtime.unload_class("A", LoaderId(1))
        })
    };
    let report = controller.run().unwrap();

    assert!(unloader.join().unwrap());
    assert_eq!(report.installed, 2);
    assert_eq!(report.remove_failures, 1);
}

#[test]
fn test_unusable_output_directory_aborts_before_install() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").unwrap();
    let runtime = Arc::new(InProcessRuntime::new());
    let a = runtime.define_class("A", LoaderId(1), &["foo"]);
    let config = SessionConfig::new("A").with_detail(true).with_output_root(&blocker);

    let result = SessionController::new(Arc::clone(&runtime), config)
        .unwrap()
        .with_reporter(CapturingReporter::default())
        .run();

    assert!(matches!(result, Err(SessionError::Sink(_))));
    assert!(!a.is_probed("foo"));
}

#[test]
fn test_statistics_consistent_under_concurrent_load() {
    let runtime = Arc::new(InProcessRuntime::new());
    let a = runtime.define_class("A", LoaderId(1), &["work"]);
    let config =
        SessionConfig::new("A").with_poll_interval(POLL).with_timeout(Duration::from_millis(200));
    let controller = SessionController::new(Arc::clone(&runtime), config)
        .unwrap()
        .with_reporter(CapturingReporter::default());

    let stop = Arc::new(AtomicBool::new(false));
    let producers: Vec<_> = (0..4)
        .map(|_| spawn_producer(a.clone(), "work", Duration::from_micros(100), 3, &stop))
        .collect();
    let report = controller.run().unwrap();
    let calls = stop_all(&stop, producers);

    let row = &report.rows[0];
    assert_eq!(row.total, report.events);
    assert!(row.total <= calls);
    assert!(row.failures > 0 && row.failures <= row.total);
    let (min, max, avg) = (row.min_ms.unwrap(), row.max_ms.unwrap(), row.avg_ms.unwrap());
    assert!(min <= avg && avg <= max, "min {min} avg {avg} max {max}");
}
