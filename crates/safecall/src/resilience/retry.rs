//! Retry with exponential backoff
//!
//! `call_with_retry` runs an operation up to `attempts` times. The delay
//! before attempt `i + 1` is `initial_delay * backoff_multiplier^(i - 1)`.
//! Each failed attempt goes through the failure funnel and logs a
//! `Retry i/attempts` notice; when every attempt fails, or the retry veto
//! returns `false`, the call ends with [`CallError::RetriesExhausted`].

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{BoxedError, CallError, CallResult, ConfigError, ConfigResult};
use crate::funnel::LogLevel;
use crate::safecall::SafeCall;
use crate::time::runtime_handle;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub attempts: u32,
    /// Delay before the second attempt
    #[serde(rename = "initial_delay_ms", with = "crate::config::duration_millis")]
    pub initial_delay: Duration,
    /// Factor applied to the delay after every failed attempt
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { attempts: 3, initial_delay: Duration::from_secs(1), backoff_multiplier: 2.0 }
    }
}

impl RetryConfig {
    /// Create a validated configuration
    pub fn new(
        attempts: u32,
        initial_delay: Duration,
        backoff_multiplier: f64,
    ) -> ConfigResult<Self> {
        let config = Self { attempts, initial_delay, backoff_multiplier };
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.attempts == 0 {
            return Err(ConfigError::invalid("attempts must be greater than 0"));
        }

        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier > 0.0) {
            return Err(ConfigError::invalid("backoff_multiplier must be greater than 0"));
        }

        Ok(())
    }

    /// Delay slept after failed attempt `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        scale(self.initial_delay, self.backoff_multiplier.powi(exponent))
    }

    /// The delay following `current`
    pub fn next_delay(&self, current: Duration) -> Duration {
        scale(current, self.backoff_multiplier)
    }
}

fn scale(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// Builder for RetryConfig with fluent API
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.config.attempts = attempts;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.config.initial_delay = delay;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.config.backoff_multiplier = multiplier;
        self
    }

    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl SafeCall {
    /// Run `operation` with retries.
    ///
    /// `config` overrides the context's retry defaults for this call only.
    ///
    /// # Errors
    /// - `CallError::RetriesExhausted` when every attempt failed or the veto
    ///   stopped retrying
    /// - `CallError::Misconfigured` when `config` is invalid, when an attempt
    ///   reports misconfiguration, or when backoff needs a Tokio runtime and
    ///   none is running
    #[instrument(skip_all)]
    pub async fn call_with_retry<F, Fut, T, E>(
        &self,
        config: Option<RetryConfig>,
        mut operation: F,
    ) -> CallResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxedError>,
    {
        let config = match config {
            Some(config) => {
                config.validate()?;
                config
            }
            None => self.retry_defaults(),
        };
        if config.attempts > 1 {
            runtime_handle()?;
        }

        let veto = self.retry_veto();
        let mut delay = config.initial_delay;

        for attempt in 1..=config.attempts {
            let error = match self.call(|| operation()).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if error.is_misconfiguration() {
                return Err(error);
            }

            if let Some(veto) = &veto {
                if !veto(&error) {
                    debug!(attempt, %error, "Retry vetoed");
                    break;
                }
            }

            self.log(LogLevel::Warn, &format!("Retry {attempt}/{}: {error}", config.attempts));

            if attempt < config.attempts {
                tokio::time::sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }

        warn!(attempts = config.attempts, "All retry attempts failed");
        Err(CallError::RetriesExhausted)
    }
}
