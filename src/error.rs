// ABOUTME: Defines all error types for the dedupe library using thiserror.
// ABOUTME: Coordinator rejections, configuration failures and HTTP layer errors.

use std::sync::Arc;
use std::time::Duration;

/// Errors surfaced by [`RequestCoordinator::execute`](crate::coordinator::RequestCoordinator::execute).
///
/// Every caller attached to the same in-flight request receives a clone of
/// the same error, so the operation's own error is held behind an `Arc`.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError<E>
where
    E: std::error::Error + 'static,
{
    #[error("request key must not be empty")]
    EmptyKey,

    #[error("request '{key}' throttled, retry in {}ms", .retry_after.as_millis())]
    Throttled { key: String, retry_after: Duration },

    #[error("request '{key}' refused after {attempts} attempts")]
    TooManyRequests { key: String, attempts: u32 },

    #[error("request '{key}' failed after {attempts} attempts: {source}")]
    OperationFailed {
        key: String,
        attempts: u32,
        #[source]
        source: Arc<E>,
    },

    #[error("request '{key}' aborted before completing")]
    Aborted { key: String },
}

impl<E> CoordinatorError<E>
where
    E: std::error::Error + 'static,
{
    /// True when the cooldown window rejected the dispatch.
    pub fn is_throttled(&self) -> bool {
        matches!(self, CoordinatorError::Throttled { .. })
    }

    /// True when the attempt ceiling rejected the dispatch.
    pub fn is_too_many_requests(&self) -> bool {
        matches!(self, CoordinatorError::TooManyRequests { .. })
    }

    /// True for rejections that never dispatched anything. Callers usually
    /// treat these as "already handled".
    pub fn is_rejected(&self) -> bool {
        self.is_throttled() || self.is_too_many_requests()
    }

    /// The last error returned by the operation, if it ran and failed.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            CoordinatorError::OperationFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl<E> Clone for CoordinatorError<E>
where
    E: std::error::Error + 'static,
{
    fn clone(&self) -> Self {
        match self {
            CoordinatorError::EmptyKey => CoordinatorError::EmptyKey,
            CoordinatorError::Throttled { key, retry_after } => CoordinatorError::Throttled {
                key: key.clone(),
                retry_after: *retry_after,
            },
            CoordinatorError::TooManyRequests { key, attempts } => {
                CoordinatorError::TooManyRequests {
                    key: key.clone(),
                    attempts: *attempts,
                }
            }
            CoordinatorError::OperationFailed {
                key,
                attempts,
                source,
            } => CoordinatorError::OperationFailed {
                key: key.clone(),
                attempts: *attempts,
                source: Arc::clone(source),
            },
            CoordinatorError::Aborted { key } => CoordinatorError::Aborted { key: key.clone() },
        }
    }
}

/// Errors from loading coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(String),

    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: String,
        value: String,
        reason: String,
    },
}

/// Errors from the coordinated HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("Deserialization error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Errors returned by [`ApiClient`](crate::http::ApiClient) calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request params: {0}")]
    Params(#[source] serde_json::Error),

    /// Rejected before reaching the coordinator; never retried.
    #[error(transparent)]
    Request(#[from] HttpError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError<HttpError>),
}

impl ApiError {
    /// True when the coordinator refused to dispatch (throttled or over the
    /// attempt ceiling).
    pub fn is_rejected(&self) -> bool {
        matches!(self, ApiError::Coordinator(err) if err.is_rejected())
    }
}
