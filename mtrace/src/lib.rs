//! # mtrace - Live Method Tracing Sessions
//!
//! mtrace attaches probes to selected methods of a running process, collects
//! one event per completed invocation from whichever threads execute them,
//! aggregates the events into per-method statistics, and removes every probe
//! again when the session ends on an invocation limit, a timeout, or an
//! explicit cancel.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Traced Application Threads                   │
//! │           (ClassHandle::invoke on probed methods)               │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ HookCell → SessionAdvice::exit_with
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │           Inbox (bounded, drop-oldest, signals kept)            │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ recv_timeout(poll interval)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Session Controller (one thread)               │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Selector   │──▶│    Probes    │──▶│  Statistic   │         │
//! │  │  (patterns)  │   │ (ProbeGuard) │   │    Table     │         │
//! │  └──────────────┘   └──────────────┘   └──────┬───────┘         │
//! │                                               │                 │
//! │                     ┌──────────────┐   ┌──────▼───────┐         │
//! │                     │    Sinks     │   │   Reports    │         │
//! │                     │ (JSON lines) │   │  (stdout)    │         │
//! │                     └──────────────┘   └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`session`]: selection, probe install/remove, inbox, advice, statistics
//!   and the controller state machine
//! - [`runtime`]: the host interfaces (class registry, hook loader, code
//!   rewriter) and an in-process implementation
//! - [`sinks`]: per-invocation `detail.log` and `stack.log` writers
//! - [`export`]: final statistics as JSON
//! - [`config`]: session settings and validation
//! - [`cli`]: command-line argument parsing
//! - [`domain`]: errors, name patterns and shared types
//! - [`workload`]: the demo shop traced by the `mtrace` binary
//!
//! ## Typical Usage
//!
//! ```bash
//! # Trace every OrderService method, stop after 100 calls
//! mtrace OrderService
//!
//! # Trace for 30 seconds, write per-call records and a JSON summary
//! mtrace '.*' -p 'shop::.*' -n 0 --timeout 30 --detail --export stats.json
//! ```
//!
//! ## Key Concepts
//!
//! - **Candidate**: a loaded class matching the package and class patterns
//! - **Probe**: a method's slot pointing at its loader's hook cell
//! - **Hook cell**: swaps atomically between the session advice and a no-op
//! - **Termination cause**: whichever of limit, timeout or cancel fired first

pub mod cli;
pub mod config;
pub mod domain;
pub mod export;
pub mod preflight;
pub mod runtime;
pub mod session;
pub mod sinks;
pub mod workload;
