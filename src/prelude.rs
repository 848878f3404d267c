// ABOUTME: Prelude module - convenient imports for common use cases.
// ABOUTME: Use `use dedupe::prelude::*;` to get started quickly.

pub use crate::coordinator::{
    Backoff, CoordinatorConfig, CoordinatorStatus, ExecuteOptions, KeySnapshot, RequestCoordinator,
};
pub use crate::error::{ApiError, ConfigError, CoordinatorError, HttpError};
pub use crate::http::{ApiClient, ApiResponse, RequestKey};
