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

/// Five concurrently outstanding callables against a nearly empty pool: the
/// total climbs to five reserved/live connections, outstanding climbs to
/// five, and idle stays at zero until recoveries happen.
#[test]
fn five_concurrent_callables_grow_the_pool_to_five() {
    let connector = StubConnector::new();
    let pool = DispatchPool::new(
        PoolOptions::builder(stub_endpoint()).idle_capacity(30).finish(),
        connector.clone(),
    )
    .expect("pool construction");

    let started = Arc::new(AtomicUsize::new(0));
    let mut callables = Vec::new();
    let mut releases = Vec::new();

    for i in 0..5u64 {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let started = Arc::clone(&started);
        let started_cb = Arc::clone(&started);
        let callable = pool.dispatch("player_summary_check", move |_conn, _scope| {
            started_cb.fetch_add(1, Ordering::SeqCst);
            release_rx
                .recv()
                .map_err(|_| SqlDispatchError::QueryError("release channel closed".into()))?;
            Ok(i)
        });
        // Wait for the operation to occupy its worker so the next dispatch
        // really runs concurrently instead of queueing behind it.
        spin_until(Duration::from_secs(5), || {
            started.load(Ordering::SeqCst) as u64 == i + 1
        });
        callables.push(callable);
        releases.push(release_tx);
    }

    let status = pool.status();
    assert_eq!(status.outstanding, 5);
    assert_eq!(status.total, 5);
    assert_eq!(status.idle, 0, "idle stays empty until recoveries occur");

    for release in &releases {
        release.send(()).expect("worker should still be waiting");
    }
    for callable in &callables {
        assert!(wait_ready(callable, Duration::from_secs(5)));
    }

    let mut seen = Vec::new();
    for callable in callables {
        seen.push(pool.recover(callable).expect("operation should succeed"));
    }
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);

    let status = pool.status();
    assert_eq!(status.outstanding, 0);
    assert_eq!(status.total, 5);
    assert_eq!(status.idle, 5, "all five connections fit under capacity 30");
    assert_eq!(connector.connects(), 5, "one seed plus four fresh connects");
}
