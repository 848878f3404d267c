// ABOUTME: Adapts a foreign RequestOperation callback into a coordinator operation.
// ABOUTME: Each attempt runs the blocking foreign call on tokio's blocking pool.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::callback::{OperationOutcome, RequestOperation};

/// Failure reported by a foreign operation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct OperationError(pub String);

impl OperationOutcome {
    fn into_result(self) -> Result<String, OperationError> {
        match (self.body, self.error) {
            (_, Some(error)) => Err(OperationError(error)),
            (body, None) => Ok(body.unwrap_or_default()),
        }
    }
}

/// Wrap a foreign operation so it can be invoked once per attempt.
pub(crate) fn operation_fn(
    operation: Box<dyn RequestOperation>,
) -> impl FnMut() -> BoxFuture<'static, Result<String, OperationError>> + Send + 'static {
    let operation: Arc<Box<dyn RequestOperation>> = Arc::new(operation);
    move || {
        let operation = operation.clone();
        async move {
            tokio::task::spawn_blocking(move || operation.perform())
                .await
                .map_err(|e| OperationError(format!("Operation task failed: {}", e)))?
                .into_result()
        }
        .boxed()
    }
}
