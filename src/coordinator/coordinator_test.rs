// ABOUTME: Tests for request coordinator dedup, throttle, retry and cleanup semantics.
// ABOUTME: Runs on a paused tokio clock so cooldowns and grace periods are deterministic.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_test::{assert_pending, task};

use super::coordinator::RequestCoordinator;
use super::options::{CoordinatorConfig, ExecuteOptions};
use crate::error::CoordinatorError;

#[derive(Debug, thiserror::Error)]
#[error("boom on call {0}")]
struct Boom(u32);

type Coordinator = RequestCoordinator<String, Boom>;

fn counter() -> Arc<AtomicU32> {
    Arc::new(AtomicU32::new(0))
}

fn calls(counter: &Arc<AtomicU32>) -> u32 {
    counter.load(Ordering::SeqCst)
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_execution() {
    let coordinator = Coordinator::new();
    let count = counter();

    let c = count.clone();
    let fetch_meals = move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(500)).await;
            Ok::<_, Boom>("[{id:1}]".to_string())
        }
    };

    let (a, b, c) = tokio::join!(
        coordinator.execute("GET:/meals:{}", fetch_meals.clone()),
        coordinator.execute("GET:/meals:{}", fetch_meals.clone()),
        coordinator.execute("GET:/meals:{}", fetch_meals),
    );

    assert_eq!(a.unwrap(), "[{id:1}]");
    assert_eq!(b.unwrap(), "[{id:1}]");
    assert_eq!(c.unwrap(), "[{id:1}]");
    assert_eq!(calls(&count), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_failure() {
    let coordinator = Coordinator::new();
    let count = counter();
    let options = ExecuteOptions::default().with_max_retries(0);

    let c = count.clone();
    let op = move || {
        let c = c.clone();
        async move {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            sleep(Duration::from_millis(100)).await;
            Err::<String, _>(Boom(n))
        }
    };

    let (a, b) = tokio::join!(
        coordinator.execute_with_options("k", op.clone(), options.clone()),
        coordinator.execute_with_options("k", op, options),
    );

    let a = a.unwrap_err();
    let b = b.unwrap_err();
    assert_eq!(calls(&count), 1);
    assert_eq!(a.operation_error().map(|e| e.0), Some(1));
    assert_eq!(b.operation_error().map(|e| e.0), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_attached_caller_waits_for_inflight_request() {
    let coordinator = Coordinator::new();
    let op = || async {
        sleep(Duration::from_secs(1)).await;
        Ok::<_, Boom>("done".to_string())
    };

    let mut first = task::spawn(coordinator.execute("k", op));
    assert_pending!(first.poll());
    assert_eq!(coordinator.status().active_keys, vec!["k".to_string()]);

    let mut second = task::spawn(coordinator.execute("k", op));
    assert_pending!(second.poll());

    assert_eq!(first.await.unwrap(), "done");
    assert_eq!(second.await.unwrap(), "done");
    assert_eq!(coordinator.status().pending_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_throttled_within_cooldown() {
    let coordinator = Coordinator::new();
    let count = counter();

    let c = count.clone();
    let add_item = move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Boom>("added".to_string())
        }
    };

    let options = ExecuteOptions::default().with_throttle(true);
    coordinator
        .execute_with_options("POST:/shopping-lists:{}", add_item.clone(), options.clone())
        .await
        .unwrap();

    sleep(Duration::from_millis(500)).await;

    let err = coordinator
        .execute_with_options("POST:/shopping-lists:{}", add_item, options)
        .await
        .unwrap_err();

    match err {
        CoordinatorError::Throttled { key, retry_after } => {
            assert_eq!(key, "POST:/shopping-lists:{}");
            assert_eq!(retry_after, Duration::from_millis(1500));
        }
        other => panic!("Expected Throttled, got {:?}", other),
    }
    assert_eq!(calls(&count), 1);
}

#[tokio::test(start_paused = true)]
async fn test_throttle_disabled_allows_redispatch() {
    let coordinator = Coordinator::new();
    let count = counter();

    let c = count.clone();
    let op = move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Boom>("ok".to_string())
        }
    };

    let options = ExecuteOptions::default().with_throttle(false);
    for _ in 0..2 {
        coordinator
            .execute_with_options("k", op.clone(), options.clone())
            .await
            .unwrap();
    }
    assert_eq!(calls(&count), 2);
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_allowed_after_cooldown() {
    let coordinator = Coordinator::new();
    let op = || async { Ok::<_, Boom>("ok".to_string()) };

    coordinator.execute("k", op).await.unwrap();
    sleep(Duration::from_millis(2000)).await;
    assert!(coordinator.execute("k", op).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_retry_then_success() {
    let coordinator = Coordinator::new();
    let count = counter();

    let c = count.clone();
    let flaky = move || {
        let c = c.clone();
        async move {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 1 {
                Err(Boom(n))
            } else {
                Ok("recovered".to_string())
            }
        }
    };

    let start = Instant::now();
    let value = coordinator
        .execute_with_options("k", flaky, ExecuteOptions::default().with_max_retries(1))
        .await
        .unwrap();

    assert_eq!(value, "recovered");
    assert_eq!(calls(&count), 2);
    assert!(start.elapsed() >= Duration::from_millis(2000));

    let snapshot = coordinator.inspect("k").expect("key should still be tracked");
    assert_eq!(snapshot.attempts, 0);
    assert!(!snapshot.pending);
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_reports_last_error() {
    let coordinator = Coordinator::new();
    let count = counter();

    let c = count.clone();
    let broken = move || {
        let c = c.clone();
        async move {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            Err::<String, _>(Boom(n))
        }
    };

    let err = coordinator
        .execute_with_options("k", broken, ExecuteOptions::default().with_max_retries(1))
        .await
        .unwrap_err();

    assert_eq!(calls(&count), 2);
    match &err {
        CoordinatorError::OperationFailed { key, attempts, source } => {
            assert_eq!(key, "k");
            assert_eq!(*attempts, 2);
            assert_eq!(source.0, 2);
        }
        other => panic!("Expected OperationFailed, got {:?}", other),
    }
    assert!(!err.is_rejected());

    let snapshot = coordinator.inspect("k").unwrap();
    assert_eq!(snapshot.attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_too_many_requests_until_grace_period() {
    let coordinator = Coordinator::new();
    let count = counter();
    let options = ExecuteOptions::default().with_max_retries(0);

    let c = count.clone();
    let broken = move || {
        let c = c.clone();
        async move {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            Err::<String, _>(Boom(n))
        }
    };

    for _ in 0..2 {
        let err = coordinator
            .execute_with_options("k", broken.clone(), options.clone())
            .await
            .unwrap_err();
        assert!(err.operation_error().is_some());
        sleep(Duration::from_millis(2000)).await;
    }

    let err = coordinator
        .execute_with_options("k", broken.clone(), options.clone())
        .await
        .unwrap_err();
    match err {
        CoordinatorError::TooManyRequests { key, attempts } => {
            assert_eq!(key, "k");
            assert_eq!(attempts, 2);
        }
        other => panic!("Expected TooManyRequests, got {:?}", other),
    }
    assert_eq!(calls(&count), 2);

    sleep(Duration::from_secs(15)).await;
    assert!(coordinator.inspect("k").is_none());

    let err = coordinator
        .execute_with_options("k", broken, options)
        .await
        .unwrap_err();
    assert!(err.operation_error().is_some());
    assert_eq!(calls(&count), 3);
}

#[tokio::test(start_paused = true)]
async fn test_independent_keys_do_not_interfere() {
    let coordinator = Coordinator::new();

    let slow = coordinator.clone();
    let handle = tokio::spawn(async move {
        slow.execute("k1", || async {
            sleep(Duration::from_secs(1)).await;
            Ok::<_, Boom>("one".to_string())
        })
        .await
    });
    tokio::task::yield_now().await;

    let two = coordinator
        .execute("k2", || async { Ok::<_, Boom>("two".to_string()) })
        .await
        .unwrap();
    assert_eq!(two, "two");
    assert_eq!(coordinator.status().active_keys, vec!["k1".to_string()]);

    assert_eq!(handle.await.unwrap().unwrap(), "one");
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_after_grace_period() {
    let coordinator = Coordinator::new();
    let count = counter();

    let c = count.clone();
    let op = move || {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Boom>("ok".to_string())
        }
    };

    coordinator.execute("k", op.clone()).await.unwrap();
    assert!(coordinator.status().active_keys.is_empty());
    assert!(coordinator.inspect("k").is_some());

    sleep(Duration::from_secs(14)).await;
    assert!(coordinator.inspect("k").is_some());

    sleep(Duration::from_secs(2)).await;
    assert!(coordinator.inspect("k").is_none());

    coordinator.execute("k", op).await.unwrap();
    assert_eq!(calls(&count), 2);
}

#[tokio::test(start_paused = true)]
async fn test_new_cycle_survives_older_cleanup() {
    let config = CoordinatorConfig {
        cooldown: Duration::from_millis(100),
        grace_period: Duration::from_secs(1),
        ..CoordinatorConfig::default()
    };
    let coordinator = Coordinator::with_config(config);
    let op = || async {
        sleep(Duration::from_millis(1000)).await;
        Ok::<_, Boom>("ok".to_string())
    };

    // First cycle settles at 1000ms; its cleanup would fire at 2000ms.
    coordinator.execute("k", op).await.unwrap();

    // Second cycle dispatched at 1100ms is still in flight at 2050ms.
    sleep(Duration::from_millis(100)).await;
    let mut second = task::spawn(coordinator.execute("k", op));
    assert_pending!(second.poll());

    sleep(Duration::from_millis(950)).await;
    assert!(coordinator.inspect("k").unwrap().pending);

    second.await.unwrap();
    assert!(coordinator.inspect("k").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_empty_key_rejected() {
    let coordinator = Coordinator::new();
    let count = counter();

    let c = count.clone();
    let result = coordinator
        .execute("", move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Boom>("never".to_string())
            }
        })
        .await;

    assert!(matches!(result, Err(CoordinatorError::EmptyKey)));
    assert_eq!(calls(&count), 0);
}

#[tokio::test(start_paused = true)]
async fn test_clear_key_during_flight() {
    let coordinator = Coordinator::new();
    let count = counter();

    // First invocation takes 500ms, later ones 1s.
    let c = count.clone();
    let op = move || {
        let c = c.clone();
        async move {
            let n = c.fetch_add(1, Ordering::SeqCst) + 1;
            let delay = if n == 1 { 500 } else { 1000 };
            sleep(Duration::from_millis(delay)).await;
            Ok::<_, Boom>(format!("call {}", n))
        }
    };

    let mut first = task::spawn(coordinator.execute("k", op.clone()));
    assert_pending!(first.poll());

    coordinator.clear_key("k");
    assert!(coordinator.inspect("k").is_none());

    let mut second = task::spawn(coordinator.execute("k", op));
    assert_pending!(second.poll());

    tokio::task::yield_now().await;
    assert_eq!(calls(&count), 2);

    assert_eq!(first.await.unwrap(), "call 1");
    // The old cycle settling must not release the new cycle's entry.
    assert!(coordinator.inspect("k").unwrap().pending);

    assert_eq!(second.await.unwrap(), "call 2");
}

#[tokio::test(start_paused = true)]
async fn test_clear_drops_all_keys() {
    let coordinator = Coordinator::new();
    let op = || async { Ok::<_, Boom>("ok".to_string()) };

    coordinator.execute("a", op).await.unwrap();
    coordinator.execute("b", op).await.unwrap();

    coordinator.clear();
    assert!(coordinator.inspect("a").is_none());
    assert!(coordinator.inspect("b").is_none());

    // No throttle state survives a clear.
    assert!(coordinator.execute("a", op).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_panicking_operation_aborts_waiters() {
    let coordinator = Coordinator::new();

    let result = coordinator
        .execute("k", || async {
            if true {
                panic!("operation exploded");
            }
            Ok::<_, Boom>("unreachable".to_string())
        })
        .await;

    assert!(matches!(result, Err(CoordinatorError::Aborted { .. })));
    assert_eq!(coordinator.status().pending_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_operation_runs_after_callers_stop_waiting() {
    let coordinator = Coordinator::new();
    let finished = counter();

    let f = finished.clone();
    let op = move || {
        let f = f.clone();
        async move {
            sleep(Duration::from_millis(500)).await;
            f.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Boom>("ok".to_string())
        }
    };

    let timed_out = tokio::time::timeout(Duration::from_millis(100), coordinator.execute("k", op))
        .await
        .is_err();
    assert!(timed_out);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(calls(&finished), 1);
    assert_eq!(coordinator.status().pending_count, 0);
}

#[tokio::test]
async fn test_coordinator_error_display() {
    let err: CoordinatorError<Boom> = CoordinatorError::Throttled {
        key: "GET:/meals:{}".to_string(),
        retry_after: Duration::from_millis(1500),
    };
    assert!(err.to_string().contains("GET:/meals:{}"));
    assert!(err.to_string().contains("1500ms"));
    assert!(err.is_throttled());
    assert!(err.is_rejected());

    let err: CoordinatorError<Boom> = CoordinatorError::TooManyRequests {
        key: "k".to_string(),
        attempts: 2,
    };
    assert!(err.to_string().contains("2 attempts"));
    assert!(err.is_too_many_requests());

    let err: CoordinatorError<Boom> = CoordinatorError::OperationFailed {
        key: "k".to_string(),
        attempts: 2,
        source: Arc::new(Boom(2)),
    };
    assert!(err.to_string().contains("boom on call 2"));
    assert!(std::error::Error::source(&err).is_some());
}
