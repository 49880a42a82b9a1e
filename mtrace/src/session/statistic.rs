//! Per-method invocation statistics.
//!
//! One [`Statistic`] row per (class, method), pre-seeded at session start so
//! methods that never ran still show up. Rows are only mutated by the session
//! loop, so the table needs no locking.
//!
//! # Performance
//!
//! - `record()`: O(log n) `BTreeMap` lookup, n = probed methods
//! - Iteration is already ordered by class name, then method name

// Averages and millisecond conversions intentionally convert to f64
#![allow(clippy::cast_precision_loss)]

use log::{debug, warn};
use mtrace_common::InvocationEvent;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::Candidate;

const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// Aggregate for one (class, method) pair.
///
/// Invariants: `failures <= total`; `min`/`max` are unset until the first
/// sample and afterwards bound every recorded elapsed time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistic {
    total: u64,
    failures: u64,
    total_elapsed_ns: u128,
    min_ns: Option<u64>,
    max_ns: Option<u64>,
}

impl Statistic {
    pub fn record(&mut self, elapsed_ns: u64, failed: bool) {
        self.total += 1;
        if failed {
            self.failures += 1;
        }
        self.total_elapsed_ns += u128::from(elapsed_ns);
        self.min_ns = Some(self.min_ns.map_or(elapsed_ns, |min| min.min(elapsed_ns)));
        self.max_ns = Some(self.max_ns.map_or(elapsed_ns, |max| max.max(elapsed_ns)));
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures
    }

    #[must_use]
    pub fn successes(&self) -> u64 {
        self.total - self.failures
    }

    #[must_use]
    pub fn min_ns(&self) -> Option<u64> {
        self.min_ns
    }

    #[must_use]
    pub fn max_ns(&self) -> Option<u64> {
        self.max_ns
    }

    /// Mean elapsed time, `None` before the first sample.
    #[must_use]
    pub fn average_ns(&self) -> Option<f64> {
        (self.total > 0).then(|| self.total_elapsed_ns as f64 / self.total as f64)
    }

    /// Failures as a percentage of all calls, `None` before the first sample.
    #[must_use]
    pub fn failure_rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.failures as f64 * 100.0 / self.total as f64)
    }
}

/// Row key. Orders by class name, then method name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodKey {
    pub class_name: Arc<str>,
    pub method_name: Arc<str>,
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.class_name, self.method_name)
    }
}

/// Serializable copy of one row, times in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticRow {
    pub class_name: String,
    pub method_name: String,
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub failure_rate: Option<f64>,
    pub min_ms: Option<f64>,
    pub max_ms: Option<f64>,
    pub avg_ms: Option<f64>,
}

#[derive(Debug, Default)]
pub struct StatisticTable {
    rows: BTreeMap<MethodKey, Statistic>,
    ignored: u64,
}

impl StatisticTable {
    /// One empty row per (candidate, matched method).
    #[must_use]
    pub fn seed(candidates: &[Candidate]) -> Self {
        let rows = candidates
            .iter()
            .flat_map(|candidate| {
                candidate.methods.iter().map(|method| MethodKey {
                    class_name: Arc::clone(&candidate.name),
                    method_name: Arc::clone(method),
                })
            })
            .map(|key| (key, Statistic::default()))
            .collect();
        Self { rows, ignored: 0 }
    }

    /// Fold one event into its row.
    ///
    /// Returns false when the event was ignored: no stop timestamp, or no
    /// row exists for its method.
    pub fn record(&mut self, event: &InvocationEvent) -> bool {
        let key = MethodKey {
            class_name: Arc::clone(&event.class_name),
            method_name: Arc::clone(&event.method_name),
        };
        let Some(elapsed_ns) = event.elapsed_ns() else {
            warn!("Ignoring event for {key} without stop timestamp");
            self.ignored += 1;
            return false;
        };
        let Some(statistic) = self.rows.get_mut(&key) else {
            debug!("Ignoring event for unseeded method {key}");
            self.ignored += 1;
            return false;
        };
        statistic.record(elapsed_ns, event.is_failure());
        true
    }

    #[must_use]
    pub fn get(&self, class_name: &str, method_name: &str) -> Option<&Statistic> {
        let key =
            MethodKey { class_name: Arc::from(class_name), method_name: Arc::from(method_name) };
        self.rows.get(&key)
    }

    pub fn rows(&self) -> impl Iterator<Item = (&MethodKey, &Statistic)> {
        self.rows.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of `total` over all rows.
    #[must_use]
    pub fn total_invocations(&self) -> u64 {
        self.rows.values().map(Statistic::total).sum()
    }

    /// Events that could not be attributed to a row.
    #[must_use]
    pub fn ignored(&self) -> u64 {
        self.ignored
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<StatisticRow> {
        self.rows
            .iter()
            .map(|(key, statistic)| StatisticRow {
                class_name: key.class_name.to_string(),
                method_name: key.method_name.to_string(),
                total: statistic.total(),
                successes: statistic.successes(),
                failures: statistic.failures(),
                failure_rate: statistic.failure_rate(),
                min_ms: statistic.min_ns().map(|ns| ns as f64 / NANOS_PER_MILLI),
                max_ms: statistic.max_ns().map(|ns| ns as f64 / NANOS_PER_MILLI),
                avg_ms: statistic.average_ns().map(|ns| ns / NANOS_PER_MILLI),
            })
            .collect()
    }
}
