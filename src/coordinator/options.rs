// ABOUTME: Per-call execution options and coordinator-wide configuration.
// ABOUTME: Covers retry budget, retry delay/backoff, throttle cooldown and grace period.

use std::time::Duration;

use crate::error::ConfigError;

/// How the delay between retries grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Wait `retry_delay` before every retry.
    #[default]
    Fixed,
    /// Wait `retry_delay * 2^(attempt - 1)`, never more than `max_delay`.
    Exponential { max_delay: Duration },
}

/// Options for a single [`execute`](super::RequestCoordinator::execute) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Base delay before a retry.
    pub retry_delay: Duration,
    /// Enforce the cooldown window between dispatches of the same key.
    pub throttle: bool,
    pub backoff: Backoff,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            max_retries: 1,
            retry_delay: Duration::from_millis(2000),
            throttle: true,
            backoff: Backoff::Fixed,
        }
    }
}

impl ExecuteOptions {
    /// Set the number of retries after the first failure.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base retry delay.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Enable or disable the cooldown check.
    pub fn with_throttle(mut self, throttle: bool) -> Self {
        self.throttle = throttle;
        self
    }

    /// Set the backoff strategy.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay to wait before retry number `attempt` (1-based).
    pub fn delay_for_retry(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.retry_delay,
            Backoff::Exponential { max_delay } => {
                let exp = 2_u32.saturating_pow(attempt.saturating_sub(1));
                self.retry_delay
                    .checked_mul(exp)
                    .unwrap_or(max_delay)
                    .min(max_delay)
            }
        }
    }
}

/// Coordinator-wide limits shared by every key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Minimum time between two accepted dispatches of the same key.
    pub cooldown: Duration,
    /// Attempt ceiling; a key whose counter reached it is refused.
    pub max_attempts: u32,
    /// Delay after settlement before per-key bookkeeping is dropped.
    pub grace_period: Duration,
    /// Options used by callers that do not supply their own.
    pub defaults: ExecuteOptions,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(2000),
            max_attempts: 2,
            grace_period: Duration::from_secs(15),
            defaults: ExecuteOptions::default(),
        }
    }
}

pub const COOLDOWN_VAR: &str = "DEDUPE_COOLDOWN_MS";
pub const MAX_ATTEMPTS_VAR: &str = "DEDUPE_MAX_ATTEMPTS";
pub const GRACE_PERIOD_VAR: &str = "DEDUPE_GRACE_PERIOD_MS";
pub const MAX_RETRIES_VAR: &str = "DEDUPE_MAX_RETRIES";
pub const RETRY_DELAY_VAR: &str = "DEDUPE_RETRY_DELAY_MS";

impl CoordinatorConfig {
    /// Load configuration from `DEDUPE_*` environment variables.
    ///
    /// Unset variables keep their default value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64>(&lookup, COOLDOWN_VAR)? {
            config.cooldown = Duration::from_millis(ms);
        }
        if let Some(max_attempts) = parse_var::<u32>(&lookup, MAX_ATTEMPTS_VAR)? {
            if max_attempts == 0 {
                return Err(ConfigError::Invalid {
                    var: MAX_ATTEMPTS_VAR.to_string(),
                    value: "0".to_string(),
                    reason: "must allow at least one attempt".to_string(),
                });
            }
            config.max_attempts = max_attempts;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, GRACE_PERIOD_VAR)? {
            config.grace_period = Duration::from_millis(ms);
        }
        if let Some(max_retries) = parse_var::<u32>(&lookup, MAX_RETRIES_VAR)? {
            config.defaults.max_retries = max_retries;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, RETRY_DELAY_VAR)? {
            config.defaults.retry_delay = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };

    raw.trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::Invalid {
            var: var.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        })
}
