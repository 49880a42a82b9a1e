//! # Probe Installation and Removal
//!
//! Drives the host's hook loader and code rewriter over the candidate set.
//!
//! - [`install_probes()`] - Publish the advice per loader, then redefine each class
//! - [`remove_probes()`] - Restore each class, then retract the loader hooks
//! - [`ProbeGuard`] - Removes probes exactly once, even if collection unwinds
//!
//! Every class is handled independently: a class that fails is logged and
//! counted, and the remaining classes are still processed.

use log::{info, warn};
use mtrace_common::{Advice, HookCell, LoaderId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::domain::Candidate;
use crate::runtime::Host;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InstallSummary {
    /// Classes redefined successfully
    pub installed: usize,
    /// Methods probed across all installed classes
    pub methods: usize,
    pub failures: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RemoveSummary {
    pub restored: usize,
    pub failures: usize,
}

/// Attach `advice` to every candidate.
///
/// The advice is published into a candidate's loader before that class is
/// redefined. A loader that rejects the hook fails all of its classes.
pub fn install_probes<H: Host + ?Sized>(
    host: &H,
    candidates: &[Candidate],
    advice: &Arc<dyn Advice>,
) -> InstallSummary {
    let mut summary = InstallSummary::default();
    let mut hooks: HashMap<LoaderId, Option<Arc<HookCell>>> = HashMap::new();

    for candidate in candidates {
        let hook = hooks.entry(candidate.loader).or_insert_with(|| {
            match host.publish(candidate.loader, Arc::clone(advice)) {
                Ok(cell) => Some(cell),
                Err(e) => {
                    warn!("⚠️  Failed to publish hook into {}: {e}", candidate.loader);
                    None
                }
            }
        });

        let Some(hook) = hook else {
            warn!("⚠️  Skipping {}: hook unavailable in {}", candidate.name, candidate.loader);
            summary.failures += 1;
            continue;
        };

        match host.rewrite(candidate, hook) {
            Ok(methods) => {
                info!("✓ Probed {} ({methods} methods)", candidate);
                summary.installed += 1;
                summary.methods += methods;
            }
            Err(e) => {
                warn!("⚠️  Failed to probe {}: {e}", candidate);
                summary.failures += 1;
            }
        }
    }

    summary
}

/// Restore every candidate and retract the hooks of their loaders.
///
/// Safe after a partial install and safe to repeat: restoring an unprobed
/// class and retracting an inactive hook are no-ops.
pub fn remove_probes<H: Host + ?Sized>(host: &H, candidates: &[Candidate]) -> RemoveSummary {
    let mut summary = RemoveSummary::default();

    for candidate in candidates {
        match host.restore(candidate) {
            Ok(()) => {
                info!("✓ Restored {candidate}");
                summary.restored += 1;
            }
            Err(e) => {
                warn!("⚠️  Failed to restore {candidate}: {e}");
                summary.failures += 1;
            }
        }
    }

    let loaders: BTreeSet<LoaderId> = candidates.iter().map(|c| c.loader).collect();
    for loader in loaders {
        host.retract(loader);
    }

    summary
}

/// Owns the obligation to remove installed probes.
///
/// Create it before [`install_probes()`] so a rewrite that unwinds still
/// restores the classes already probed.
pub struct ProbeGuard<'a, H: Host + ?Sized> {
    host: &'a H,
    candidates: &'a [Candidate],
    removed: bool,
}

impl<'a, H: Host + ?Sized> ProbeGuard<'a, H> {
    #[must_use]
    pub fn new(host: &'a H, candidates: &'a [Candidate]) -> Self {
        Self { host, candidates, removed: false }
    }

    /// Remove the probes. Returns `None` if they were already removed.
    pub fn remove(&mut self) -> Option<RemoveSummary> {
        if self.removed {
            return None;
        }
        self.removed = true;
        Some(remove_probes(self.host, self.candidates))
    }
}

impl<H: Host + ?Sized> Drop for ProbeGuard<'_, H> {
    fn drop(&mut self) {
        if !self.removed {
            warn!("Session ended abnormally, removing probes");
            self.remove();
        }
    }
}
