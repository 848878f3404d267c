// ABOUTME: Callback interfaces implemented by Swift/Kotlin.
// ABOUTME: Operations to coordinate, and receivers for their settled results.

use crate::types::ExecuteFailure;

/// Result of one attempt of a foreign operation.
///
/// Set `error` to fail the attempt; otherwise `body` (or an empty string) is
/// the successful result.
#[derive(Debug, Clone, Default, uniffi::Record)]
pub struct OperationOutcome {
    pub body: Option<String>,
    pub error: Option<String>,
}

/// A request the mobile client wants coordinated, usually a network call.
/// Called on a blocking worker thread, once per attempt.
#[uniffi::export(callback_interface)]
pub trait RequestOperation: Send + Sync {
    fn perform(&self) -> OperationOutcome;
}

/// Receives the settled result of an `execute` call.
#[uniffi::export(callback_interface)]
pub trait ExecuteCallback: Send + Sync {
    /// Called with the operation's body once it succeeded.
    fn on_success(&self, key: String, body: String);

    /// Called when the request was rejected or failed after retries.
    fn on_failure(&self, key: String, failure: ExecuteFailure);
}
