//! # Host Runtime Interfaces
//!
//! The session controller never touches method bodies itself. It drives three
//! narrow collaborators supplied by the host runtime:
//!
//! - [`ClassRegistry`] - snapshot of the classes currently loaded
//! - [`HookLoader`] - makes the session's advice reachable from a loader
//! - [`CodeRewriter`] - redefines a class so matched methods call the advice
//!
//! [`Host`] bundles the three. [`InProcessRuntime`] is the host for Rust
//! applications that route their method bodies through [`ClassHandle`].

use mtrace_common::{Advice, HookCell, LoaderId};
use std::sync::Arc;

use crate::domain::{Candidate, RewriteError};

pub mod in_process;

pub use in_process::{ClassHandle, InProcessRuntime};

/// One loaded class as reported by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    /// Fully qualified name (`module::path::Type`)
    pub name: Arc<str>,
    pub loader: LoaderId,
    /// False for sealed classes that cannot be redefined after load
    pub modifiable: bool,
    /// Declared method names, in declaration order
    pub methods: Vec<Arc<str>>,
}

pub trait ClassRegistry: Send + Sync {
    /// Classes loaded right now, in discovery order.
    fn loaded_classes(&self) -> Vec<ClassInfo>;
}

pub trait HookLoader: Send + Sync {
    /// Publish `advice` into `loader` and return the cell probes call through.
    ///
    /// # Errors
    /// Returns [`RewriteError::HookRejected`] if the loader cannot host the hook.
    fn publish(
        &self,
        loader: LoaderId,
        advice: Arc<dyn Advice>,
    ) -> Result<Arc<HookCell>, RewriteError>;

    /// Swap the loader's hook back to no-op. Idempotent.
    fn retract(&self, loader: LoaderId);
}

pub trait CodeRewriter: Send + Sync {
    /// Redefine the candidate's class so each matched method calls `hook` on
    /// entry and exit. Returns the number of probed methods.
    ///
    /// # Errors
    /// Returns an error if the class cannot be redefined.
    fn rewrite(&self, candidate: &Candidate, hook: &Arc<HookCell>) -> Result<usize, RewriteError>;

    /// Redefine the class back to its original behavior. A class without
    /// probes is left untouched.
    ///
    /// # Errors
    /// Returns an error if the class cannot be redefined.
    fn restore(&self, candidate: &Candidate) -> Result<(), RewriteError>;
}

/// Everything the session controller needs from the host runtime.
pub trait Host: ClassRegistry + HookLoader + CodeRewriter {}

impl<T: ClassRegistry + HookLoader + CodeRewriter> Host for T {}
