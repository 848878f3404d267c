// ABOUTME: Root module for dedupe - request coordination for API clients.
// ABOUTME: Re-exports the coordinator, HTTP layer and error types.

pub mod coordinator;
pub mod error;
pub mod http;
pub mod prelude;

pub use coordinator::{CoordinatorConfig, ExecuteOptions, RequestCoordinator};
pub use error::{ApiError, CoordinatorError};
