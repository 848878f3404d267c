// ABOUTME: Coordinator module for keyed request execution.
// ABOUTME: Deduplication, throttling, retry and grace-period cleanup.

mod coordinator;
mod options;
mod state;

pub use coordinator::RequestCoordinator;
pub use options::{
    Backoff, COOLDOWN_VAR, CoordinatorConfig, ExecuteOptions, GRACE_PERIOD_VAR, MAX_ATTEMPTS_VAR,
    MAX_RETRIES_VAR, RETRY_DELAY_VAR,
};
pub use state::{CoordinatorStatus, KeySnapshot};

#[cfg(test)]
mod coordinator_test;
