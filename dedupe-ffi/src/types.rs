// ABOUTME: Records and enums exposed to Swift/Kotlin via UniFFI.
// ABOUTME: Millisecond-based mirrors of the coordinator's config, options and errors.

use std::time::Duration;

use dedupe::coordinator::{Backoff, CoordinatorConfig, CoordinatorStatus, ExecuteOptions};
use dedupe::error::CoordinatorError;

use crate::DedupeFfiError;
use crate::bridge::OperationError;

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCoordinatorConfig {
    pub cooldown_ms: u64,
    pub max_attempts: u32,
    pub grace_period_ms: u64,
    pub default_max_retries: u32,
    pub default_retry_delay_ms: u64,
}

impl Default for FfiCoordinatorConfig {
    fn default() -> Self {
        let config = CoordinatorConfig::default();
        Self {
            cooldown_ms: config.cooldown.as_millis() as u64,
            max_attempts: config.max_attempts,
            grace_period_ms: config.grace_period.as_millis() as u64,
            default_max_retries: config.defaults.max_retries,
            default_retry_delay_ms: config.defaults.retry_delay.as_millis() as u64,
        }
    }
}

impl TryFrom<FfiCoordinatorConfig> for CoordinatorConfig {
    type Error = DedupeFfiError;

    fn try_from(config: FfiCoordinatorConfig) -> Result<Self, Self::Error> {
        if config.max_attempts == 0 {
            return Err(DedupeFfiError::InvalidConfig {
                message: "max_attempts must allow at least one attempt".to_string(),
            });
        }

        Ok(Self {
            cooldown: Duration::from_millis(config.cooldown_ms),
            max_attempts: config.max_attempts,
            grace_period: Duration::from_millis(config.grace_period_ms),
            defaults: ExecuteOptions::default()
                .with_max_retries(config.default_max_retries)
                .with_retry_delay(Duration::from_millis(config.default_retry_delay_ms)),
        })
    }
}

/// Per-call overrides. Unset fields fall back to the coordinator defaults.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct FfiExecuteOptions {
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub throttle: Option<bool>,
    /// Enables exponential backoff capped at this many milliseconds.
    pub backoff_max_delay_ms: Option<u64>,
}

impl FfiExecuteOptions {
    pub(crate) fn resolve(self, defaults: &ExecuteOptions) -> ExecuteOptions {
        let mut options = defaults.clone();
        if let Some(max_retries) = self.max_retries {
            options.max_retries = max_retries;
        }
        if let Some(ms) = self.retry_delay_ms {
            options.retry_delay = Duration::from_millis(ms);
        }
        if let Some(throttle) = self.throttle {
            options.throttle = throttle;
        }
        if let Some(ms) = self.backoff_max_delay_ms {
            options.backoff = Backoff::Exponential {
                max_delay: Duration::from_millis(ms),
            };
        }
        options
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct FfiCoordinatorStatus {
    pub pending_count: u32,
    pub active_keys: Vec<String>,
}

impl From<CoordinatorStatus> for FfiCoordinatorStatus {
    fn from(status: CoordinatorStatus) -> Self {
        Self {
            pending_count: status.pending_count as u32,
            active_keys: status.active_keys,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FailureKind {
    EmptyKey,
    Throttled,
    TooManyRequests,
    OperationFailed,
    Aborted,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct ExecuteFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Set for `Throttled`.
    pub retry_after_ms: Option<u64>,
    /// Set for `TooManyRequests` and `OperationFailed`.
    pub attempts: Option<u32>,
}

impl From<&CoordinatorError<OperationError>> for ExecuteFailure {
    fn from(err: &CoordinatorError<OperationError>) -> Self {
        let message = err.to_string();
        match err {
            CoordinatorError::EmptyKey => Self {
                kind: FailureKind::EmptyKey,
                message,
                retry_after_ms: None,
                attempts: None,
            },
            CoordinatorError::Throttled { retry_after, .. } => Self {
                kind: FailureKind::Throttled,
                message,
                retry_after_ms: Some(retry_after.as_millis() as u64),
                attempts: None,
            },
            CoordinatorError::TooManyRequests { attempts, .. } => Self {
                kind: FailureKind::TooManyRequests,
                message,
                retry_after_ms: None,
                attempts: Some(*attempts),
            },
            CoordinatorError::OperationFailed {
                attempts, source, ..
            } => Self {
                kind: FailureKind::OperationFailed,
                message: source.to_string(),
                retry_after_ms: None,
                attempts: Some(*attempts),
            },
            CoordinatorError::Aborted { .. } => Self {
                kind: FailureKind::Aborted,
                message,
                retry_after_ms: None,
                attempts: None,
            },
        }
    }
}
