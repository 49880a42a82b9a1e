//! Periodic statistics reports.
//!
//! A [`ReportSink`] receives the table at every report tick and once at
//! drain. [`StdoutReporter`] renders it as a fixed-width table, one line per
//! seeded method, with `-` in place of timings before the first sample.

// Time conversions intentionally lose precision for display purposes
#![allow(clippy::cast_precision_loss)]

use std::fmt::Write as _;

use super::statistic::{Statistic, StatisticTable};

/// Shown in place of timings before a method's first sample
pub const NO_DATA: &str = "-";

/// Receives the statistics table at every report tick and once at drain.
pub trait ReportSink: Send {
    fn report(&mut self, table: &StatisticTable, final_report: bool);
}

/// Prints the table to stdout.
#[derive(Debug, Default)]
pub struct StdoutReporter;

impl ReportSink for StdoutReporter {
    fn report(&mut self, table: &StatisticTable, final_report: bool) {
        if final_report {
            println!("\nfinal statistics:");
        }
        println!("{}", render_table(table));
    }
}

/// Render the table, one line per method, ordered by class then method.
#[must_use]
pub fn render_table(table: &StatisticTable) -> String {
    let names: Vec<String> = table.rows().map(|(key, _)| key.to_string()).collect();
    let width = names.iter().map(String::len).max().unwrap_or(0).max("METHOD".len());

    let mut out = String::new();
    let _ = write!(
        out,
        "{:<width$}  {:>8}  {:>6}  {:>6}  {:>10}  {:>10}  {:>10}",
        "METHOD", "TOTAL", "FAIL", "FAIL%", "MIN(ms)", "MAX(ms)", "AVG(ms)"
    );
    for (name, (_, statistic)) in names.iter().zip(table.rows()) {
        let _ = write!(out, "\n{}", render_row(name, statistic, width));
    }
    out
}

fn render_row(name: &str, statistic: &Statistic, width: usize) -> String {
    let rate = statistic.failure_rate().map_or_else(|| NO_DATA.to_string(), |r| format!("{r:.1}"));
    format!(
        "{name:<width$}  {:>8}  {:>6}  {rate:>6}  {:>10}  {:>10}  {:>10}",
        statistic.total(),
        statistic.failures(),
        millis(statistic.min_ns().map(|ns| ns as f64)),
        millis(statistic.max_ns().map(|ns| ns as f64)),
        millis(statistic.average_ns()),
    )
}

fn millis(nanos: Option<f64>) -> String {
    nanos.map_or_else(|| NO_DATA.to_string(), |ns| format!("{:.3}", ns / 1_000_000.0))
}
