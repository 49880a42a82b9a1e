//! Session configuration
//!
//! Built from CLI arguments in the binary, or directly with the `with_*`
//! methods when embedding the controller.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::{ConfigError, MethodPattern, NamePattern};
use crate::session::ClassFilter;

/// How often the statistics table is printed
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound of one inbox wait; timers are re-checked at least this often
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Waits longer than this make timeout checks sluggish
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Queued messages before the inbox starts evicting the oldest event
pub const DEFAULT_INBOX_CAPACITY: usize = 8192;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Regex for the package part of class names
    pub package_pattern: String,
    /// Regex for the simple class name
    pub class_pattern: String,
    /// Regexes for method names (any match selects the method)
    pub method_patterns: Vec<String>,
    /// Stop after this many invocations (`None` = unlimited)
    pub limit: Option<u64>,
    /// Stop after this much wall time (`None` = unlimited)
    pub timeout: Option<Duration>,
    pub report_interval: Duration,
    pub poll_interval: Duration,
    pub inbox_capacity: usize,
    /// Write one record per invocation to `detail.log`
    pub detail: bool,
    /// Capture call stacks and write them to `stack.log`
    pub stack: bool,
    /// Sink files go to `<output_root>/<pid>/`
    pub output_root: PathBuf,
}

impl SessionConfig {
    #[must_use]
    pub fn new(class_pattern: impl Into<String>) -> Self {
        Self {
            package_pattern: ".*".to_string(),
            class_pattern: class_pattern.into(),
            method_patterns: vec![".*".to_string()],
            limit: None,
            timeout: None,
            report_interval: DEFAULT_REPORT_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            detail: false,
            stack: false,
            output_root: default_output_root(),
        }
    }

    #[must_use]
    pub fn with_package(mut self, pattern: impl Into<String>) -> Self {
        self.package_pattern = pattern.into();
        self
    }

    #[must_use]
    pub fn with_methods<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.method_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// A limit of zero means unlimited.
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    /// A zero timeout means unlimited.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    #[must_use]
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_detail(mut self, enabled: bool) -> Self {
        self.detail = enabled;
        self
    }

    #[must_use]
    pub fn with_stack(mut self, enabled: bool) -> Self {
        self.stack = enabled;
        self
    }

    #[must_use]
    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    #[must_use]
    pub fn sinks_enabled(&self) -> bool {
        self.detail || self.stack
    }

    /// Check the settings and compile the selection patterns.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] naming the first invalid setting or pattern.
    pub fn validate(&self) -> Result<ClassFilter, ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(invalid("poll interval", "must be greater than zero"));
        }
        if self.poll_interval > MAX_POLL_INTERVAL {
            return Err(invalid(
                "poll interval",
                format!("must not exceed {}ms", MAX_POLL_INTERVAL.as_millis()),
            ));
        }
        if self.report_interval.is_zero() {
            return Err(invalid("report interval", "must be greater than zero"));
        }
        if self.inbox_capacity == 0 {
            return Err(invalid("inbox capacity", "must be greater than zero"));
        }

        Ok(ClassFilter::new(
            NamePattern::new("package", &self.package_pattern)?,
            NamePattern::new("class", &self.class_pattern)?,
            MethodPattern::new(&self.method_patterns)?,
        ))
    }
}

/// `$TMPDIR/mtrace`
#[must_use]
pub fn default_output_root() -> PathBuf {
    std::env::temp_dir().join("mtrace")
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidSetting { name, reason: reason.into() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SessionConfig::new("OrderService");
        assert!(config.validate().is_ok());
        assert_eq!(config.limit, None);
        assert_eq!(config.timeout, None);
        assert!(!config.sinks_enabled());
    }

    #[test]
    fn test_zero_limit_and_timeout_mean_unlimited() {
        let config = SessionConfig::new("X").with_limit(0).with_timeout(Duration::ZERO);
        assert_eq!(config.limit, None);
        assert_eq!(config.timeout, None);

        let config = SessionConfig::new("X").with_limit(5).with_timeout(Duration::from_secs(3));
        assert_eq!(config.limit, Some(5));
        assert_eq!(config.timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_slow_poll_interval_rejected() {
        let config = SessionConfig::new("X").with_poll_interval(Duration::from_secs(5));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("poll interval"));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = SessionConfig::new("X").with_inbox_capacity(0);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSetting { .. })));
    }

    #[test]
    fn test_bad_class_pattern_rejected() {
        let config = SessionConfig::new("Order[");
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::InvalidPattern { kind: "class", .. })));
    }

    #[test]
    fn test_empty_method_list_rejected() {
        let config = SessionConfig::new("X").with_methods(Vec::<String>::new());
        assert!(matches!(config.validate(), Err(ConfigError::EmptyMethodPattern)));
    }
}
