//! Ignore patterns for known-noisy failures
//!
//! A failure whose message matches any registered pattern is suppressed from
//! observability: it is neither logged nor handed to global handlers. The
//! caller still receives the failed result.

use parking_lot::RwLock;
use regex::Regex;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Ordered, read-mostly list of compiled ignore patterns
#[derive(Debug, Default)]
pub struct ErrorFilterChain {
    patterns: RwLock<Vec<Regex>>,
}

impl ErrorFilterChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pattern (regular expression syntax)
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidPattern` when the pattern does not compile.
    pub fn add(&self, pattern: &str) -> ConfigResult<()> {
        let compiled = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        self.patterns.write().push(compiled);
        debug!(pattern, "Registered error ignore pattern");
        Ok(())
    }

    /// Whether `message` matches any registered pattern
    pub fn is_suppressed(&self, message: &str) -> bool {
        self.patterns.read().iter().any(|pattern| pattern.is_match(message))
    }

    /// Registered pattern sources, in registration order
    pub fn patterns(&self) -> Vec<String> {
        self.patterns.read().iter().map(|p| p.as_str().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every pattern
    pub fn clear(&self) {
        self.patterns.write().clear();
    }
}
