//! In-process host runtime
//!
//! Rust applications define their traceable "classes" here and run method
//! bodies through [`ClassHandle::invoke`]. Each method owns a probe slot:
//! empty while untraced, pointing at a loader's [`HookCell`] while probed.
//! Redefining a class means swapping its slots, so a call that already
//! started finishes against the slot it loaded.

use arc_swap::ArcSwapOption;
use log::debug;
use mtrace_common::{monotonic_nanos, Advice, CallContext, CallSite, HookCell, LoaderId, Outcome};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::{ClassInfo, ClassRegistry, CodeRewriter, HookLoader};
use crate::domain::{Candidate, RewriteError};

struct MethodSlot {
    site: CallSite,
    probe: ArcSwapOption<HookCell>,
}

struct ClassDef {
    name: Arc<str>,
    loader: LoaderId,
    sealed: bool,
    methods: Vec<MethodSlot>,
}

impl ClassDef {
    fn slot(&self, method: &str) -> Option<&MethodSlot> {
        self.methods.iter().find(|slot| &*slot.site.method_name == method)
    }

    fn info(&self) -> ClassInfo {
        ClassInfo {
            name: Arc::clone(&self.name),
            loader: self.loader,
            modifiable: !self.sealed,
            methods: self.methods.iter().map(|s| Arc::clone(&s.site.method_name)).collect(),
        }
    }
}

/// Handle application code invokes methods through.
#[derive(Clone)]
pub struct ClassHandle {
    def: Arc<ClassDef>,
}

impl ClassHandle {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.def.name
    }

    #[must_use]
    pub fn loader(&self) -> LoaderId {
        self.def.loader
    }

    /// Whether calls to `method` currently go through a probe.
    #[must_use]
    pub fn is_probed(&self, method: &str) -> bool {
        self.def.slot(method).is_some_and(|slot| slot.probe.load().is_some())
    }

    /// Run a fallible method body.
    ///
    /// While probed, the body is timed and its outcome reported to the hook:
    /// `Err` as a failure, a panic as a failure before the unwind resumes.
    /// Undeclared method names run unprobed.
    ///
    /// # Errors
    /// Returns whatever the body returns.
    pub fn invoke<T, E, F>(&self, method: &str, body: F) -> Result<T, E>
    where
        E: fmt::Display,
        F: FnOnce() -> Result<T, E>,
    {
        let Some(slot) = self.def.slot(method) else {
            return body();
        };
        let Some(hook) = slot.probe.load_full() else {
            return body();
        };

        let start_ns = monotonic_nanos();
        hook.enter(&CallContext::entering(&slot.site, start_ns));

        let result = panic::catch_unwind(AssertUnwindSafe(body));

        let stop_ns = monotonic_nanos();
        let outcome = match &result {
            Ok(Ok(_)) => Outcome::Returned,
            Ok(Err(e)) => Outcome::Failed(e.to_string()),
            Err(payload) => {
                Outcome::Failed(format!("panicked: {}", panic_message(payload.as_ref())))
            }
        };
        hook.exit(&CallContext::exiting(&slot.site, start_ns, stop_ns, &outcome));

        match result {
            Ok(value) => value,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Run an infallible method body.
    pub fn call<T>(&self, method: &str, body: impl FnOnce() -> T) -> T {
        match self.invoke::<T, std::convert::Infallible, _>(method, || Ok(body())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }
}

impl fmt::Debug for ClassHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassHandle")
            .field("name", &self.def.name)
            .field("loader", &self.def.loader)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}

/// Class table and hook registry of the current process.
#[derive(Default)]
pub struct InProcessRuntime {
    classes: RwLock<Vec<Arc<ClassDef>>>,
    hooks: RwLock<HashMap<LoaderId, Arc<HookCell>>>,
}

impl InProcessRuntime {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a class that can be redefined later.
    pub fn define_class(&self, name: &str, loader: LoaderId, methods: &[&str]) -> ClassHandle {
        self.define(name, loader, methods, false)
    }

    /// Load a sealed class. Sealed classes are never probed.
    pub fn define_sealed_class(
        &self,
        name: &str,
        loader: LoaderId,
        methods: &[&str],
    ) -> ClassHandle {
        self.define(name, loader, methods, true)
    }

    fn define(&self, name: &str, loader: LoaderId, methods: &[&str], sealed: bool) -> ClassHandle {
        let name: Arc<str> = Arc::from(name);
        let methods = methods
            .iter()
            .map(|method| MethodSlot {
                site: CallSite::new(Arc::clone(&name), *method, loader),
                probe: ArcSwapOption::empty(),
            })
            .collect();
        let def = Arc::new(ClassDef { name, loader, sealed, methods });
        self.classes.write().push(Arc::clone(&def));
        debug!("Loaded class {} ({loader})", def.name);
        ClassHandle { def }
    }

    /// Drop a class from the table. Existing handles keep working.
    pub fn unload_class(&self, name: &str, loader: LoaderId) -> bool {
        let mut classes = self.classes.write();
        let before = classes.len();
        classes.retain(|def| !(&*def.name == name && def.loader == loader));
        classes.len() != before
    }

    fn find(&self, name: &str, loader: LoaderId) -> Option<Arc<ClassDef>> {
        self.classes.read().iter().find(|def| &*def.name == name && def.loader == loader).cloned()
    }
}

impl ClassRegistry for InProcessRuntime {
    fn loaded_classes(&self) -> Vec<ClassInfo> {
        self.classes.read().iter().map(|def| def.info()).collect()
    }
}

impl HookLoader for InProcessRuntime {
    fn publish(
        &self,
        loader: LoaderId,
        advice: Arc<dyn Advice>,
    ) -> Result<Arc<HookCell>, RewriteError> {
        if !self.classes.read().iter().any(|def| def.loader == loader) {
            return Err(RewriteError::HookRejected {
                loader,
                reason: "no class of this loader is loaded".to_string(),
            });
        }
        let cell = Arc::clone(
            self.hooks.write().entry(loader).or_insert_with(|| Arc::new(HookCell::new(loader))),
        );
        cell.activate(advice);
        Ok(cell)
    }

    fn retract(&self, loader: LoaderId) {
        if let Some(cell) = self.hooks.read().get(&loader) {
            cell.reset();
        }
    }
}

impl CodeRewriter for InProcessRuntime {
    fn rewrite(&self, candidate: &Candidate, hook: &Arc<HookCell>) -> Result<usize, RewriteError> {
        let def = self
            .find(&candidate.name, candidate.loader)
            .ok_or_else(|| RewriteError::ClassNotLoaded(candidate.name.to_string()))?;
        if def.sealed {
            return Err(RewriteError::Unmodifiable(candidate.name.to_string()));
        }

        let mut probed = 0;
        for slot in def.methods.iter().filter(|s| candidate.has_method(&s.site.method_name)) {
            slot.probe.store(Some(Arc::clone(hook)));
            probed += 1;
        }
        Ok(probed)
    }

    fn restore(&self, candidate: &Candidate) -> Result<(), RewriteError> {
        let def = self
            .find(&candidate.name, candidate.loader)
            .ok_or_else(|| RewriteError::ClassNotLoaded(candidate.name.to_string()))?;
        for slot in &def.methods {
            slot.probe.store(None);
        }
        Ok(())
    }
}
