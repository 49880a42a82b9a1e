//! Pre-flight checks for mtrace
//!
//! Validates the output locations before any probe is installed.
//! Provides clear, actionable error messages when they aren't usable.

use anyhow::{bail, Result};
use std::path::Path;

use crate::config::SessionConfig;

/// Run all pre-flight checks before the session starts
pub fn run_preflight_checks(
    config: &SessionConfig,
    export: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    if config.sinks_enabled() {
        check_output_root(&config.output_root)?;
    }
    if let Some(path) = export {
        check_export_target(path)?;
    }
    check_stack_capture(config, quiet);
    Ok(())
}

/// The output root must be a directory, or not exist yet
fn check_output_root(root: &Path) -> Result<()> {
    if root.exists() && !root.is_dir() {
        bail!(
            "Not a directory: {}\n\n\
             --output-dir must point to a directory; detail and stack logs \
             are written to <output-dir>/<pid>/.",
            root.display()
        );
    }
    Ok(())
}

/// The export file's parent directory must exist
fn check_export_target(path: &Path) -> Result<()> {
    if path.is_dir() {
        bail!(
            "Is a directory: {}\n\n\
             --export must name a file, not a directory.",
            path.display()
        );
    }
    let parent = path.parent().filter(|parent| !parent.as_os_str().is_empty());
    if let Some(parent) = parent {
        if !parent.is_dir() {
            bail!(
                "Directory not found: {}\n\n\
                 Create it first, or choose another --export path.",
                parent.display()
            );
        }
    }
    Ok(())
}

/// Stack capture slows every probed call down noticeably
fn check_stack_capture(config: &SessionConfig, quiet: bool) {
    if quiet || !config.stack {
        return;
    }
    if config.limit.is_none() && config.timeout.is_none() {
        eprintln!("warning: stack capture without --limit or --timeout, stop with Ctrl+C");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_root_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("taken");
        std::fs::write(&file, b"x").unwrap();
        let config = SessionConfig::new(".*").with_detail(true).with_output_root(&file);

        let err = run_preflight_checks(&config, None, true).unwrap_err().to_string();
        assert!(err.contains("Not a directory"));
    }

    #[test]
    fn test_output_root_ignored_without_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("taken");
        std::fs::write(&file, b"x").unwrap();
        let config = SessionConfig::new(".*").with_output_root(&file);

        assert!(run_preflight_checks(&config, None, true).is_ok());
    }

    #[test]
    fn test_export_directory_not_found() {
        let config = SessionConfig::new(".*");
        let export = Path::new("/nonexistent/dir/stats.json");
        let result = run_preflight_checks(&config, Some(export), true);

        let err = result.unwrap_err().to_string();
        assert!(err.contains("not found"));
    }

    #[test]
    fn test_export_to_relative_file_accepted() {
        let config = SessionConfig::new(".*");
        assert!(run_preflight_checks(&config, Some(Path::new("stats.json")), true).is_ok());
    }
}
