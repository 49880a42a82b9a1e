//! Candidate selection
//!
//! Filters the loaded classes by package and simple-name pattern, and
//! records the methods of each class that the method pattern selects.
//! Classes that cannot be redefined are excluded with a warning; selection
//! itself never fails.

use log::{debug, warn};
use mtrace_common::LoaderId;
use std::fmt;
use std::sync::Arc;

use crate::domain::{split_class_name, Candidate, MethodPattern, NamePattern};
use crate::runtime::{ClassInfo, ClassRegistry};

/// Compiled selection patterns for one session.
#[derive(Debug, Clone)]
pub struct ClassFilter {
    package: NamePattern,
    class: NamePattern,
    methods: MethodPattern,
}

/// A matching class that was left out of the candidate set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionWarning {
    pub class_name: Arc<str>,
    pub loader: LoaderId,
    pub reason: &'static str,
}

impl fmt::Display for SelectionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot probe {} ({}): {}", self.class_name, self.loader, self.reason)
    }
}

/// Result of one selection pass.
#[derive(Debug, Default)]
pub struct Selection {
    /// Selected classes, in discovery order
    pub candidates: Vec<Candidate>,
    pub warnings: Vec<SelectionWarning>,
}

impl ClassFilter {
    #[must_use]
    pub fn new(package: NamePattern, class: NamePattern, methods: MethodPattern) -> Self {
        Self { package, class, methods }
    }

    #[must_use]
    pub fn matches_class(&self, name: &str) -> bool {
        let (package, simple_name) = split_class_name(name);
        self.package.matches(package) && self.class.matches(simple_name)
    }

    /// Apply the filter to a registry snapshot.
    #[must_use]
    pub fn select(&self, classes: Vec<ClassInfo>) -> Selection {
        let mut selection = Selection::default();

        for class in classes {
            if !self.matches_class(&class.name) {
                continue;
            }
            if !class.modifiable {
                selection.warnings.push(SelectionWarning {
                    class_name: class.name,
                    loader: class.loader,
                    reason: "class is sealed",
                });
                continue;
            }

            let methods: Vec<Arc<str>> =
                class.methods.into_iter().filter(|m| self.methods.matches(m)).collect();
            if methods.is_empty() {
                debug!("{} matched but none of its methods match '{}'", class.name, self.methods);
            }
            let candidate = Candidate { name: class.name, loader: class.loader, methods };
            selection.candidates.push(candidate);
        }

        selection
    }
}

impl fmt::Display for ClassFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "package={} class={} method={}", self.package, self.class, self.methods)
    }
}

/// Scan the registry and log every exclusion.
pub fn select_candidates<R: ClassRegistry + ?Sized>(
    registry: &R,
    filter: &ClassFilter,
) -> Selection {
    let selection = filter.select(registry.loaded_classes());
    for warning in &selection.warnings {
        warn!("⚠️  {warning}");
    }
    debug!("Selected {} candidate classes ({filter})", selection.candidates.len());
    selection
}
