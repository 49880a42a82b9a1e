//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{default_output_root, SessionConfig, DEFAULT_INBOX_CAPACITY};

#[derive(Parser, Debug)]
#[command(
    name = "mtrace",
    about = "Trace method invocations of the demo shop and print live statistics",
    after_help = "\
EXAMPLES:
    mtrace OrderService                       All methods of OrderService
    mtrace '.*' -p 'shop::.*' -m reserve      Only reserve(), any shop class
    mtrace Stock.* -n 0 --timeout 5           Unlimited calls, stop after 5s
    mtrace '.*' --detail --export stats.json  Per-call log and JSON summary"
)]
pub struct Args {
    /// Regex for the simple class name (anchored)
    #[arg(value_name = "CLASS_PATTERN")]
    pub class_pattern: String,

    /// Regex for the package part of the class name (anchored)
    #[arg(short, long, default_value = ".*")]
    pub package: String,

    /// Regex for method names, repeatable (default: all methods)
    #[arg(short, long = "method", value_name = "PATTERN")]
    pub methods: Vec<String>,

    /// Stop after N invocations (0 = unlimited)
    #[arg(short = 'n', long, default_value = "100")]
    pub limit: u64,

    /// Stop after N seconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub timeout: u64,

    /// Print the statistics table every N seconds
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Write one JSON record per invocation to detail.log
    #[arg(long)]
    pub detail: bool,

    /// Capture call stacks into stack.log (slow)
    #[arg(long)]
    pub stack: bool,

    /// Directory for detail and stack logs (default: $TMPDIR/mtrace)
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Export final statistics to a JSON file
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Demo workload threads
    #[arg(long, default_value = "4", value_parser = clap::value_parser!(u64).range(1..=64))]
    pub threads: u64,

    /// Queued events before the oldest are dropped
    #[arg(long, default_value_t = DEFAULT_INBOX_CAPACITY)]
    pub inbox_capacity: usize,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(&self.class_pattern)
            .with_package(&self.package)
            .with_limit(self.limit)
            .with_timeout(Duration::from_secs(self.timeout))
            .with_report_interval(Duration::from_secs(self.interval))
            .with_inbox_capacity(self.inbox_capacity)
            .with_detail(self.detail)
            .with_stack(self.stack)
            .with_output_root(self.output_dir.clone().unwrap_or_else(default_output_root));
        if !self.methods.is_empty() {
            config = config.with_methods(&self.methods);
        }
        config
    }
}
