use std::thread;
use std::time::{Duration, Instant};

use sql_dispatch::prelude::*;
use sql_dispatch::test_utils::{StubConnector, stub_endpoint, wait_ready};

/// Dispatch cost is bounded by the pool lock and one thread spawn — it does
/// not scale with query latency.
#[test]
fn dispatch_returns_before_a_slow_query_finishes() {
    let pool = DispatchPool::new(
        PoolOptions::builder(stub_endpoint()).finish(),
        StubConnector::new(),
    )
    .expect("pool construction");

    let dispatched_at = Instant::now();
    let callable = pool.dispatch("player_summary_check", |_conn, _scope| {
        thread::sleep(Duration::from_millis(250));
        Ok(42u64)
    });
    let dispatch_cost = dispatched_at.elapsed();

    assert!(
        dispatch_cost < Duration::from_millis(150),
        "dispatch took {dispatch_cost:?}, it must not wait for the query"
    );
    assert!(
        !callable.is_ready(),
        "a 250ms query cannot be ready at dispatch return"
    );

    assert!(wait_ready(&callable, Duration::from_secs(5)));
    assert_eq!(pool.recover(callable).expect("operation should succeed"), 42);
}
