use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use sql_dispatch::prelude::*;
use sql_dispatch::test_utils::{StubConnector, stub_endpoint, wait_ready};

fn spin_until(deadline: Duration, cond: impl Fn() -> bool) {
    let start = Instant::now();
    while !cond() {
        assert!(start.elapsed() < deadline, "condition never became true");
        thread::sleep(Duration::from_millis(2));
    }
}

/// A successful callable recovered while the idle queue is already at
/// capacity has its connection closed, not queued: idle stays at capacity and
/// the total drops by one.
#[test]
fn recovery_at_capacity_closes_instead_of_pooling() {
    let connector = StubConnector::new();
    let pool = DispatchPool::new(
        PoolOptions::builder(stub_endpoint()).idle_capacity(2).finish(),
        connector.clone(),
    )
    .expect("pool construction");

    let started = Arc::new(AtomicUsize::new(0));
    let mut callables = Vec::new();
    let mut releases = Vec::new();
    for i in 0..4usize {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let started = Arc::clone(&started);
        let started_cb = Arc::clone(&started);
        let callable = pool.dispatch("score_check", move |_conn, _scope| {
            started_cb.fetch_add(1, Ordering::SeqCst);
            release_rx
                .recv()
                .map_err(|_| SqlDispatchError::QueryError("release channel closed".into()))?;
            Ok(())
        });
        spin_until(Duration::from_secs(5), || {
            started.load(Ordering::SeqCst) == i + 1
        });
        callables.push(callable);
        releases.push(release_tx);
    }
    assert_eq!(pool.status().total, 4);

    for release in &releases {
        release.send(()).expect("worker should still be waiting");
    }
    for callable in &callables {
        assert!(wait_ready(callable, Duration::from_secs(5)));
    }

    // First two recoveries fill the idle queue; the next two must evict.
    for (i, callable) in callables.into_iter().enumerate() {
        pool.recover(callable).expect("operation should succeed");
        let status = pool.status();
        assert!(status.idle <= 2, "idle exceeded capacity after recovery {i}");
    }

    let status = pool.status();
    assert_eq!(status.idle, 2, "idle remains at capacity");
    assert_eq!(status.total, 2);
    assert_eq!(status.outstanding, 0);
    assert_eq!(status.stats.connections_evicted, 2);
    assert_eq!(connector.closes(), 2);
}
