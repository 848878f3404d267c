// ABOUTME: FfiCoordinator - the request coordinator object exposed to mobile clients.
// ABOUTME: Owns a tokio runtime so in-flight requests and cleanup timers outlive each call.

use std::sync::Arc;

use dedupe::coordinator::{CoordinatorConfig, RequestCoordinator};

use crate::DedupeFfiError;
use crate::bridge::{OperationError, operation_fn};
use crate::callback::{ExecuteCallback, RequestOperation};
use crate::types::{ExecuteFailure, FfiCoordinatorConfig, FfiCoordinatorStatus, FfiExecuteOptions};

#[derive(uniffi::Object)]
pub struct FfiCoordinator {
    runtime: tokio::runtime::Runtime,
    inner: RequestCoordinator<String, OperationError>,
}

#[uniffi::export]
impl FfiCoordinator {
    #[uniffi::constructor]
    pub fn new(config: FfiCoordinatorConfig) -> Result<Arc<Self>, DedupeFfiError> {
        let config = CoordinatorConfig::try_from(config)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("dedupe-ffi")
            .enable_all()
            .build()
            .map_err(|e| DedupeFfiError::Runtime {
                message: format!("Failed to create async runtime: {}", e),
            })?;

        Ok(Arc::new(Self {
            runtime,
            inner: RequestCoordinator::with_config(config),
        }))
    }

    /// Coordinate `operation` under `key`. Returns immediately; the result is
    /// delivered to `callback` once the request settles or is rejected.
    pub fn execute(
        &self,
        key: String,
        operation: Box<dyn RequestOperation>,
        options: FfiExecuteOptions,
        callback: Box<dyn ExecuteCallback>,
    ) {
        let coordinator = self.inner.clone();
        let options = options.resolve(&coordinator.config().defaults);

        self.runtime.spawn(async move {
            let result = coordinator
                .execute_with_options(key.clone(), operation_fn(operation), options)
                .await;
            match result {
                Ok(body) => callback.on_success(key, body),
                Err(err) => {
                    tracing::debug!(key = %key, error = %err, "reporting failure to callback");
                    callback.on_failure(key, ExecuteFailure::from(&err));
                }
            }
        });
    }

    /// Drop all coordinator state, e.g. on logout.
    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn clear_key(&self, key: String) {
        self.inner.clear_key(&key);
    }

    pub fn status(&self) -> FfiCoordinatorStatus {
        self.inner.status().into()
    }
}
