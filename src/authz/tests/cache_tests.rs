//! Policy cache concurrency tests
//!
//! Single-flight builds, failure sharing, cancellation and key isolation.

use cretoai_permission::{AuthzError, CacheOptions, Policy, PolicyCache};
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Barrier};

const CALLERS: usize = 32;

// ============================================================================
// SINGLE-FLIGHT
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_get_or_create_runs_factory_once() {
    let cache = Arc::new(PolicyCache::new(CacheOptions::default()));
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let cache = cache.clone();
            let calls = calls.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                cache
                    .get_or_create("new-policy", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Policy::for_permission("new-policy")
                    })
                    .await
                    .unwrap()
            })
        })
        .collect();

    let policies: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(calls.load(Ordering::SeqCst), 1, "factory must run exactly once");
    for policy in &policies {
        assert!(Arc::ptr_eq(policy, &policies[0]), "all callers share one policy");
    }

    let stats = cache.stats();
    assert_eq!(stats.builds, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.joins + stats.hits, CALLERS - 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_build_is_shared_then_forgotten() {
    let cache = Arc::new(PolicyCache::new(CacheOptions::default()));
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let calls = calls.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                cache
                    .get_or_create("broken", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Err::<Policy, _>(AuthzError::Internal("factory failed".to_string()))
                    })
                    .await
            })
        })
        .collect();

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    // Callers arriving after the failure start a fresh build, so only the
    // first wave is guaranteed to share a single call.
    let failures = results.iter().filter(|r| r.is_err()).count();
    assert_eq!(failures, 8);
    assert!(calls.load(Ordering::SeqCst) >= 1);
    assert!(!cache.contains("broken"));
    assert_eq!(cache.stats().in_flight, 0);

    let recovered = cache
        .get_or_create("broken", || async { Policy::for_permission("broken") })
        .await
        .unwrap();
    assert_eq!(recovered.name(), "broken");
    assert!(cache.contains("broken"));
}

#[tokio::test]
async fn test_waiters_receive_the_same_error() {
    let cache = Arc::new(PolicyCache::new(CacheOptions::default()));
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = oneshot::channel::<()>();

    let leader = {
        let cache = cache.clone();
        let calls = calls.clone();
        tokio::spawn(async move {
            cache
                .get_or_create("gated", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let _ = rx.await;
                    Err::<Policy, _>(AuthzError::InvalidPermission("rejected".to_string()))
                })
                .await
        })
    };

    while cache.stats().in_flight == 0 {
        tokio::task::yield_now().await;
    }

    let follower = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .get_or_create("gated", || async { Policy::for_permission("gated") })
                .await
        })
    };
    while cache.stats().joins == 0 {
        tokio::task::yield_now().await;
    }

    tx.send(()).unwrap();

    let leader_err = leader.await.unwrap().unwrap_err();
    let follower_err = follower.await.unwrap().unwrap_err();
    assert_eq!(leader_err, follower_err);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().failed_builds, 1);
}

#[tokio::test]
async fn test_panicking_factory_does_not_wedge_key() {
    let cache = PolicyCache::new(CacheOptions::default());
    let explode = true;

    let err = cache
        .get_or_create("orders.read", move || async move {
            if explode {
                panic!("factory exploded");
            }
            Policy::for_permission("orders.read")
        })
        .await
        .unwrap_err();
    match err {
        AuthzError::Internal(msg) => assert!(msg.contains("factory exploded")),
        other => panic!("expected internal error, got {:?}", other),
    }

    let stats = cache.stats();
    assert_eq!(stats.failed_builds, 1);
    assert_eq!(stats.in_flight, 0);
    assert!(cache.is_empty());

    let policy = cache
        .get_or_create("orders.read", || async { Policy::for_permission("orders.read") })
        .await
        .unwrap();
    assert_eq!(policy.name(), "orders.read");
    assert_eq!(cache.stats().builds, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panic_in_spawned_build_recovers_for_next_caller() {
    let cache = Arc::new(PolicyCache::new(CacheOptions::default()));
    let explode = true;

    let first = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .get_or_create("k", move || async move {
                    if explode {
                        panic!("boom");
                    }
                    Policy::for_permission("k")
                })
                .await
        })
    };
    assert!(first.await.unwrap().is_err());

    let second = cache
        .get_or_create("k", || async { Policy::for_permission("k") })
        .await
        .unwrap();
    assert_eq!(second.name(), "k");
    assert!(cache.contains("k"));
}

// ============================================================================
// ISOLATION AND CANCELLATION
// ============================================================================

#[tokio::test]
async fn test_distinct_keys_do_not_block() {
    let cache = Arc::new(PolicyCache::new(CacheOptions::default()));
    let (tx, rx) = oneshot::channel::<()>();

    let slow = {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .get_or_create("slow", move || async move {
                    let _ = rx.await;
                    Policy::for_permission("slow")
                })
                .await
        })
    };

    while cache.stats().in_flight == 0 {
        tokio::task::yield_now().await;
    }

    let fast = tokio::time::timeout(
        Duration::from_secs(1),
        cache.get_or_create("fast", || async { Policy::for_permission("fast") }),
    )
    .await
    .expect("unrelated key must not wait on an in-flight build")
    .unwrap();
    assert_eq!(fast.name(), "fast");

    tx.send(()).unwrap();
    assert_eq!(slow.await.unwrap().unwrap().name(), "slow");
}

#[tokio::test]
async fn test_cancelled_leader_build_completes_for_next_caller() {
    let cache = Arc::new(PolicyCache::new(CacheOptions::default()));
    let leader_calls = Arc::new(AtomicUsize::new(0));
    let follower_calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = oneshot::channel::<()>();

    let leader = {
        let cache = cache.clone();
        let leader_calls = leader_calls.clone();
        tokio::spawn(async move {
            cache
                .get_or_create("orders.read", move || async move {
                    leader_calls.fetch_add(1, Ordering::SeqCst);
                    let _ = rx.await;
                    Policy::for_permission("orders.read")
                })
                .await
        })
    };

    while cache.stats().in_flight == 0 {
        tokio::task::yield_now().await;
    }
    leader.abort();
    assert!(leader.await.unwrap_err().is_cancelled());

    tx.send(()).unwrap();

    let follower_calls_clone = follower_calls.clone();
    let policy = cache
        .get_or_create("orders.read", move || async move {
            follower_calls_clone.fetch_add(1, Ordering::SeqCst);
            Policy::for_permission("orders.read")
        })
        .await
        .unwrap();

    assert_eq!(policy.name(), "orders.read");
    assert_eq!(leader_calls.load(Ordering::SeqCst), 1);
    assert_eq!(follower_calls.load(Ordering::SeqCst), 0);
    assert!(cache.contains("orders.read"));
}
