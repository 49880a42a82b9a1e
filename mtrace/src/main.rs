//! # mtrace - Main Entry Point
//!
//! Runs one tracing session against the built-in demo shop. The session runs
//! on a blocking thread while the async side waits for it or for Ctrl+C,
//! which cancels the session so probes are removed before exit.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mtrace::cli::Args;
use mtrace::domain::{ConfigError, SessionError, TerminationCause};
use mtrace::export::StatisticsExporter;
use mtrace::preflight::run_preflight_checks;
use mtrace::runtime::InProcessRuntime;
use mtrace::session::SessionController;
use mtrace::sinks::process_dir;
use mtrace::workload::{install_demo_classes, spawn_workers};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let usage = err.chain().any(|cause| {
        cause.downcast_ref::<ConfigError>().is_some()
            || matches!(cause.downcast_ref::<SessionError>(), Some(SessionError::Config(_)))
    });
    if usage {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

/// Whether a finished Ctrl+C wait means the user interrupted. A handler that
/// could not be installed is logged and the session runs to its own end.
fn interrupted(signal: std::io::Result<()>) -> bool {
    match signal {
        Ok(()) => true,
        Err(e) => {
            warn!("Ctrl+C handler unavailable, waiting for the session to end: {e}");
            false
        }
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;
    let config = args.session_config();
    let threads = usize::try_from(args.threads).context("Invalid --threads")?;

    run_preflight_checks(&config, args.export.as_deref(), quiet)?;

    let log_dir = config.sinks_enabled().then(|| process_dir(&config.output_root));
    let runtime = Arc::new(InProcessRuntime::new());
    let app = Arc::new(install_demo_classes(&runtime));
    let controller = SessionController::new(Arc::clone(&runtime), config)?;
    let cancel = controller.cancel_handle();

    if !quiet {
        println!("mtrace v{}", env!("CARGO_PKG_VERSION"));
        println!("package: {}", args.package);
        println!("class: {}", args.class_pattern);
        println!("workers: {threads}");
        if let Some(ref dir) = log_dir {
            println!("logs: {}", dir.display());
        }
    }

    // ── Start the workload, then the session on a blocking thread ───────
    let stop = Arc::new(AtomicBool::new(false));
    let workers = spawn_workers(&app, threads, &stop).context("Failed to start demo workers")?;

    let mut session = tokio::task::spawn_blocking(move || controller.run());
    let finished = tokio::select! {
        joined = &mut session => Some(joined),
        signal = tokio::signal::ctrl_c() => {
            if interrupted(signal) { None } else { Some((&mut session).await) }
        }
    };
    let joined = if let Some(joined) = finished {
        joined
    } else {
        info!("Ctrl+C received, cancelling session");
        cancel.cancel();
        session.await
    };

    stop.store(true, Ordering::Relaxed);
    for worker in workers {
        worker.join().ok();
    }

    let report = joined.context("Session thread failed")??;

    // Print summary
    if !quiet {
        if report.cause == TerminationCause::NoMatchedClass {
            eprintln!("\nno class matched, nothing was probed");
        } else {
            eprintln!(
                "\n{}: {:.1}s, {} events ({} dropped), {}/{} classes probed ({} install failures, {} remove failures)",
                report.cause,
                report.elapsed_secs,
                report.events,
                report.dropped,
                report.installed,
                report.candidates,
                report.install_failures,
                report.remove_failures,
            );
        }
    }

    if let Some(ref export_path) = args.export {
        StatisticsExporter::new(&report)
            .export_to_file(export_path)
            .context("Failed to export statistics")?;
        if !quiet {
            println!("saved: {}", export_path.display());
        }
    }

    Ok(())
}
