// ABOUTME: Request coordinator - deduplicates, throttles and retries keyed operations.
// ABOUTME: Concurrent callers with the same key share a single in-flight execution.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::options::{CoordinatorConfig, ExecuteOptions};
use super::state::{CoordinatorStatus, KeyEntry, KeySnapshot, SharedResult, State};
use crate::error::CoordinatorError;

struct Inner<T, E>
where
    E: std::error::Error + 'static,
{
    config: CoordinatorConfig,
    state: Mutex<State<T, E>>,
}

/// Coordinates keyed asynchronous operations.
///
/// For every key the coordinator guarantees:
///
/// - **Deduplication:** callers arriving while an operation is in flight attach
///   to it and observe the same value or error.
/// - **Throttling:** a new dispatch inside the cooldown window fails with
///   [`CoordinatorError::Throttled`] (unless the call disables throttling).
/// - **Attempt ceiling:** once `max_attempts` dispatches failed without a
///   success in between, new dispatches fail with
///   [`CoordinatorError::TooManyRequests`] until the grace period expires.
/// - **Bounded memory:** bookkeeping is dropped `grace_period` after a cycle
///   settles unless a newer cycle started.
///
/// Dispatched operations run on their own tokio task and always run to
/// completion, even if every caller stops waiting.
///
/// Cloning is cheap; clones share state.
pub struct RequestCoordinator<T, E>
where
    E: std::error::Error + 'static,
{
    inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for RequestCoordinator<T, E>
where
    E: std::error::Error + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> Default for RequestCoordinator<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> RequestCoordinator<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    /// Create a coordinator with the default limits.
    pub fn new() -> Self {
        Self::with_config(CoordinatorConfig::default())
    }

    /// Create a coordinator with custom limits.
    pub fn with_config(config: CoordinatorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Execute `operation` under `key` with the configured default options.
    pub async fn execute<F, Fut>(
        &self,
        key: impl Into<String>,
        operation: F,
    ) -> Result<T, CoordinatorError<E>>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let options = self.inner.config.defaults.clone();
        self.execute_with_options(key, operation, options).await
    }

    /// Execute `operation` under `key`.
    ///
    /// `operation` is invoked once per attempt and must be safe to retry.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::EmptyKey`] if `key` is empty.
    /// - [`CoordinatorError::Throttled`] if the key was dispatched less than
    ///   `cooldown` ago and `options.throttle` is set.
    /// - [`CoordinatorError::TooManyRequests`] if the attempt ceiling is reached.
    /// - [`CoordinatorError::OperationFailed`] with the last error once retries
    ///   are exhausted.
    /// - [`CoordinatorError::Aborted`] if the operation panicked.
    pub async fn execute_with_options<F, Fut>(
        &self,
        key: impl Into<String>,
        operation: F,
        options: ExecuteOptions,
    ) -> Result<T, CoordinatorError<E>>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let shared = self.dispatch(key.into(), operation, options)?;
        shared.await
    }

    /// Decide whether to attach, reject or dispatch. Runs entirely under the
    /// state lock so two callers can never both dispatch the same key.
    fn dispatch<F, Fut>(
        &self,
        key: String,
        operation: F,
        options: ExecuteOptions,
    ) -> Result<SharedResult<T, E>, CoordinatorError<E>>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        if key.is_empty() {
            return Err(CoordinatorError::EmptyKey);
        }

        let config = &self.inner.config;
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let now = Instant::now();

        if let Some(entry) = state.keys.get(&key) {
            if let Some(pending) = &entry.pending {
                tracing::debug!(key = %key, "attaching to in-flight request");
                return Ok(pending.clone());
            }

            if options.throttle {
                if let Some(last) = entry.last_dispatch {
                    let elapsed = now.saturating_duration_since(last);
                    if elapsed < config.cooldown {
                        let retry_after = config.cooldown - elapsed;
                        tracing::warn!(
                            key = %key,
                            retry_after_ms = retry_after.as_millis() as u64,
                            "request throttled"
                        );
                        return Err(CoordinatorError::Throttled { key, retry_after });
                    }
                }
            }

            if entry.attempts >= config.max_attempts {
                tracing::warn!(key = %key, attempts = entry.attempts, "attempt ceiling reached");
                return Err(CoordinatorError::TooManyRequests {
                    attempts: entry.attempts,
                    key,
                });
            }
        }

        state.next_dispatch += 1;
        let dispatch_id = state.next_dispatch;

        let entry = state.keys.entry(key.clone()).or_default();
        entry.cancel_cleanup();
        entry.attempts += 1;
        entry.last_dispatch = Some(now);
        entry.dispatch_id = dispatch_id;

        tracing::debug!(key = %key, attempts = entry.attempts, dispatch_id, "dispatching request");

        let task = tokio::spawn(self.clone().run(key.clone(), dispatch_id, operation, options));
        let shared = task
            .map(move |joined| match joined {
                Ok(result) => result,
                Err(_) => Err(CoordinatorError::Aborted { key }),
            })
            .boxed()
            .shared();

        entry.pending = Some(shared.clone());
        Ok(shared)
    }

    /// Body of the spawned task: retry loop, then settlement bookkeeping.
    async fn run<F, Fut>(
        self,
        key: String,
        dispatch_id: u64,
        mut operation: F,
        options: ExecuteOptions,
    ) -> Result<T, CoordinatorError<E>>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let outcome = AssertUnwindSafe(Self::retry_loop(&key, &mut operation, &options))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(key = %key, "operation panicked");
                Err(CoordinatorError::Aborted { key: key.clone() })
            }
        };

        self.settle(&key, dispatch_id, result.is_ok());
        result
    }

    async fn retry_loop<F, Fut>(
        key: &str,
        operation: &mut F,
        options: &ExecuteOptions,
    ) -> Result<T, CoordinatorError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut retries = 0u32;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if retries < options.max_retries => {
                    retries += 1;
                    let delay = options.delay_for_retry(retries);
                    tracing::debug!(
                        key = %key,
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    let attempts = retries + 1;
                    tracing::warn!(key = %key, attempts, error = %err, "operation failed");
                    return Err(CoordinatorError::OperationFailed {
                        key: key.to_string(),
                        attempts,
                        source: Arc::new(err),
                    });
                }
            }
        }
    }

    /// Release the pending entry and schedule grace-period cleanup.
    fn settle(&self, key: &str, dispatch_id: u64, succeeded: bool) {
        let mut state = self.inner.state.lock();
        let Some(entry) = state.keys.get_mut(key) else {
            return;
        };
        if entry.dispatch_id != dispatch_id {
            return;
        }

        entry.pending = None;
        if succeeded {
            entry.attempts = 0;
        }

        let weak = Arc::downgrade(&self.inner);
        let grace = self.inner.config.grace_period;
        let owned_key = key.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            expire(&weak, &owned_key, dispatch_id);
        });
        entry.cancel_cleanup();
        entry.cleanup = Some(timer.abort_handle());
    }

    /// Drop all state for every key and cancel scheduled cleanups.
    ///
    /// Callers already waiting on an in-flight operation still receive its
    /// result; the operation no longer affects coordinator state.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        for entry in state.keys.values_mut() {
            entry.cancel_cleanup();
        }
        let dropped = state.keys.len();
        state.keys.clear();
        tracing::debug!(dropped, "cleared coordinator state");
    }

    /// Drop all state for one key.
    pub fn clear_key(&self, key: &str) {
        let mut state = self.inner.state.lock();
        if let Some(mut entry) = state.keys.remove(key) {
            entry.cancel_cleanup();
            tracing::debug!(key = %key, "cleared key state");
        }
    }

    /// Keys with a request in flight.
    pub fn status(&self) -> CoordinatorStatus {
        let state = self.inner.state.lock();
        let mut active_keys: Vec<String> = state
            .keys
            .iter()
            .filter(|(_, entry)| entry.pending.is_some())
            .map(|(key, _)| key.clone())
            .collect();
        active_keys.sort();

        CoordinatorStatus {
            pending_count: active_keys.len(),
            active_keys,
        }
    }

    /// Bookkeeping currently held for `key`, if any.
    pub fn inspect(&self, key: &str) -> Option<KeySnapshot> {
        let state = self.inner.state.lock();
        state.keys.get(key).map(|entry| KeySnapshot {
            pending: entry.pending.is_some(),
            attempts: entry.attempts,
            since_last_dispatch: entry.last_dispatch.map(|at| at.elapsed()),
        })
    }
}

/// Grace-period expiry. Removes the key unless a newer cycle owns it.
fn expire<T, E>(inner: &Weak<Inner<T, E>>, key: &str, dispatch_id: u64)
where
    E: std::error::Error + 'static,
{
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut state = inner.state.lock();

    let stale = state
        .keys
        .get(key)
        .is_some_and(|entry: &KeyEntry<T, E>| {
            entry.dispatch_id == dispatch_id && entry.pending.is_none()
        });
    if stale {
        state.keys.remove(key);
        tracing::trace!(key = %key, "expired key state");
    }
}
