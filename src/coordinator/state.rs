// ABOUTME: Per-key bookkeeping held by the request coordinator.
// ABOUTME: Pending shared future, attempt counter, last dispatch time, cleanup timer.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::error::CoordinatorError;

/// The future every caller of one in-flight request awaits.
pub(crate) type SharedResult<T, E> = Shared<BoxFuture<'static, Result<T, CoordinatorError<E>>>>;

/// Bookkeeping for one key.
pub(crate) struct KeyEntry<T, E>
where
    E: std::error::Error + 'static,
{
    /// Present from dispatch until the retry loop settles.
    pub pending: Option<SharedResult<T, E>>,
    pub attempts: u32,
    pub last_dispatch: Option<Instant>,
    /// Id of the most recent dispatch; older cycles must not touch this entry.
    pub dispatch_id: u64,
    pub cleanup: Option<AbortHandle>,
}

impl<T, E> Default for KeyEntry<T, E>
where
    E: std::error::Error + 'static,
{
    fn default() -> Self {
        Self {
            pending: None,
            attempts: 0,
            last_dispatch: None,
            dispatch_id: 0,
            cleanup: None,
        }
    }
}

impl<T, E> KeyEntry<T, E>
where
    E: std::error::Error + 'static,
{
    /// Stop the scheduled grace-period cleanup, if any.
    pub fn cancel_cleanup(&mut self) {
        if let Some(handle) = self.cleanup.take() {
            handle.abort();
        }
    }
}

/// All mutable coordinator state, guarded by a single mutex.
pub(crate) struct State<T, E>
where
    E: std::error::Error + 'static,
{
    pub keys: HashMap<String, KeyEntry<T, E>>,
    pub next_dispatch: u64,
}

impl<T, E> Default for State<T, E>
where
    E: std::error::Error + 'static,
{
    fn default() -> Self {
        Self {
            keys: HashMap::new(),
            next_dispatch: 0,
        }
    }
}

/// Snapshot of in-flight requests, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CoordinatorStatus {
    pub pending_count: usize,
    /// Keys with a request in flight, sorted.
    pub active_keys: Vec<String>,
}

/// Snapshot of the bookkeeping held for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySnapshot {
    /// A request for this key is in flight.
    pub pending: bool,
    /// Dispatches counted since the last success.
    pub attempts: u32,
    /// Time since the last accepted dispatch.
    pub since_last_dispatch: Option<Duration>,
}
