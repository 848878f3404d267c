// ABOUTME: UniFFI bindings for dedupe - exposes request coordination to Swift/Kotlin.
// ABOUTME: Mobile clients hand in operations as callbacks and receive results the same way.

uniffi::setup_scaffolding!();

mod bridge;
mod callback;
mod coordinator;
mod types;

pub use callback::{ExecuteCallback, OperationOutcome, RequestOperation};
pub use coordinator::FfiCoordinator;
pub use types::{
    ExecuteFailure, FailureKind, FfiCoordinatorConfig, FfiCoordinatorStatus, FfiExecuteOptions,
};

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum DedupeFfiError {
    #[error("Runtime error: {message}")]
    Runtime { message: String },

    #[error("Invalid config: {message}")]
    InvalidConfig { message: String },
}

#[uniffi::export]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
