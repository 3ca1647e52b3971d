//! Error types shared by every policy.
//!
//! Failures are deliberately shallow: an operation failure is an opaque
//! message plus an optional cause, and policy rejections are unit variants
//! whose `Display` output is a fixed sentinel message. Callers that only look
//! at the message (`"Circuit breaker open"`, `"Rate limited"`, `"Timeout"`,
//! `"All retry attempts failed"`) keep working, while Rust callers can match
//! on the variant instead.
//!
//! | Kind | Variant | Reported to handlers |
//! |------|---------|----------------------|
//! | Operation failure | [`CallError::Failed`] | yes (unless filtered) |
//! | Policy rejection | `CircuitOpen`, `RateLimited`, `Timeout`, `RetriesExhausted` | no |
//! | Configuration misuse | [`CallError::Misconfigured`] | no, surfaced immediately |

use std::sync::Arc;

use thiserror::Error;

/// Boxed error accepted from wrapped operations
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared, cloneable cause attached to a captured failure
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Result of a guarded call
pub type CallResult<T> = Result<T, CallError>;

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Error returned by every guarded call
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// The wrapped operation failed or panicked
    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        cause: Option<SharedError>,
        /// Set once the failure has been through a `SafeCall` funnel
        reported: bool,
    },

    /// The circuit breaker rejected the call without running it
    #[error("Circuit breaker open")]
    CircuitOpen,

    /// The rate limiter rejected the call without running it
    #[error("Rate limited")]
    RateLimited,

    /// The call did not finish within its deadline
    #[error("Timeout")]
    Timeout,

    /// Every retry attempt failed, or the retry veto stopped retrying
    #[error("All retry attempts failed")]
    RetriesExhausted,

    /// A required collaborator is missing or a setting is invalid
    #[error("Misconfigured: {message}")]
    Misconfigured { message: String },
}

impl CallError {
    /// Create an operation failure from a plain message
    pub fn failed<S: Into<String>>(message: S) -> Self {
        Self::Failed { message: message.into(), cause: None, reported: false }
    }

    /// Create a configuration misuse error
    pub fn misconfigured<S: Into<String>>(message: S) -> Self {
        Self::Misconfigured { message: message.into() }
    }

    /// Convert an arbitrary boxed error into a `CallError`.
    ///
    /// A `CallError` produced by a nested policy passes through unchanged so
    /// that sentinel rejections survive composition.
    pub fn from_boxed(error: BoxedError) -> Self {
        match error.downcast::<CallError>() {
            Ok(call_error) => *call_error,
            Err(other) => {
                let message = other.to_string();
                Self::Failed { message, cause: Some(Arc::from(other)), reported: false }
            }
        }
    }

    /// Human-readable message, identical to the `Display` output
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// The structured cause of an operation failure, if one was captured
    pub fn cause(&self) -> Option<&SharedError> {
        match self {
            Self::Failed { cause, .. } => cause.as_ref(),
            _ => None,
        }
    }

    /// Whether a policy declined to run (or finish) the call
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::CircuitOpen | Self::RateLimited | Self::Timeout | Self::RetriesExhausted)
    }

    /// Whether the wrapped operation itself failed
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Whether a funnel still has to see this error.
    ///
    /// Only operation failures are reported, and only once: a failure
    /// returned by a nested policy has already been through the funnel.
    pub fn needs_report(&self) -> bool {
        matches!(self, Self::Failed { reported: false, .. })
    }

    pub(crate) fn mark_reported(&mut self) {
        if let Self::Failed { reported, .. } = self {
            *reported = true;
        }
    }

    /// Whether this is a configuration misuse
    pub fn is_misconfiguration(&self) -> bool {
        matches!(self, Self::Misconfigured { .. })
    }
}

impl From<ConfigError> for CallError {
    fn from(error: ConfigError) -> Self {
        Self::Misconfigured { message: error.to_string() }
    }
}

/// Errors raised while building or loading configuration
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Invalid ignore pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Config file not found: {path}")]
    NotFound { path: String },

    #[error("Invalid {format} format: {message}")]
    Parse { format: String, message: String },
}

impl ConfigError {
    /// Create a validation error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid { message: message.into() }
    }
}
