//! Name patterns used to select classes and methods.
//!
//! Every pattern is a regular expression matched against the whole name:
//! `Order.*` matches `OrderService` but not `PlaceOrder`.

use regex::Regex;
use std::fmt;

use super::errors::ConfigError;

/// One anchored regular expression.
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    /// Compile `pattern` so it only matches complete names.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidPattern`] if the expression does not compile.
    pub fn new(kind: &'static str, pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
            ConfigError::InvalidPattern {
                kind,
                pattern: pattern.to_string(),
                source: Box::new(source),
            }
        })?;
        Ok(Self { source: pattern.to_string(), regex })
    }

    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Rules deciding which methods of a selected class get probed.
///
/// A method is matched when any of the patterns matches its name.
#[derive(Debug, Clone)]
pub struct MethodPattern {
    patterns: Vec<NamePattern>,
}

impl MethodPattern {
    /// # Errors
    /// Returns an error if the list is empty or any pattern fails to compile.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        if patterns.is_empty() {
            return Err(ConfigError::EmptyMethodPattern);
        }
        let patterns = patterns
            .iter()
            .map(|p| NamePattern::new("method", p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    #[must_use]
    pub fn matches(&self, method: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(method))
    }
}

impl fmt::Display for MethodPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.patterns.iter().map(NamePattern::as_str).collect();
        f.write_str(&joined.join("|"))
    }
}
