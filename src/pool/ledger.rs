use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Cumulative counters carried alongside the live pool state.
///
/// `connections_created` counts slots reserved for a fresh connect even when
/// the connect later fails; the failed callable's recovery bumps
/// `connections_evicted` to balance it, so
/// `total == connections_created - connections_evicted` holds at all times.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub connections_created: u64,
    pub connections_evicted: u64,
    pub callables_recovered: u64,
}

/// Diagnostic snapshot of a pool, taken under its lock.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Idle connections awaiting reuse.
    pub idle: usize,
    /// All live connections, checked out or idle (plus reserved slots).
    pub total: usize,
    /// Dispatched callables not yet recovered.
    pub outstanding: usize,
    pub stats: PoolStats,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "connections: {}/{} idle, outstanding callables: {}",
            self.idle, self.total, self.outstanding
        )
    }
}

/// The pool's only shared mutable state: the idle queue and its counters,
/// everything behind one mutex held just long enough for queue/counter
/// mutation — never while a query runs or a connection closes.
pub(crate) struct Ledger<T> {
    state: Mutex<State<T>>,
    idle_capacity: usize,
}

struct State<T> {
    idle: VecDeque<T>,
    total: usize,
    outstanding: usize,
    stats: PoolStats,
}

impl<T> Ledger<T> {
    pub(crate) fn new(idle_capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                idle: VecDeque::new(),
                total: 0,
                outstanding: 0,
                stats: PoolStats::default(),
            }),
            idle_capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the eagerly established first connection.
    pub(crate) fn seed(&self, conn: T) {
        let mut state = self.lock();
        state.idle.push_back(conn);
        state.total += 1;
        state.stats.connections_created += 1;
    }

    /// Take an idle connection, or reserve a slot for a fresh one.
    ///
    /// Returns `None` on a pool miss; the callable will establish the
    /// connection itself, and the slot reserved here is released again when it
    /// is recovered. Also counts the callable as outstanding, all under the
    /// one lock so the counters cannot drift between dispatch steps.
    pub(crate) fn checkout(&self) -> Option<T> {
        let mut state = self.lock();
        state.outstanding += 1;
        match state.idle.pop_front() {
            Some(conn) => Some(conn),
            None => {
                state.total += 1;
                state.stats.connections_created += 1;
                None
            }
        }
    }

    /// Return a recovered callable's connection, or evict it.
    ///
    /// Eviction happens when the callable carried an error, when the idle
    /// queue is already at capacity, or when no connection was ever
    /// established (the reserved slot is just released). The evicted
    /// connection is handed back so the caller can close it outside the lock.
    pub(crate) fn check_in(&self, conn: Option<T>, had_error: bool) -> Option<T> {
        let mut state = self.lock();
        if state.outstanding == 0 {
            tracing::warn!("recovered a callable with zero outstanding");
        } else {
            state.outstanding -= 1;
        }
        state.stats.callables_recovered += 1;

        let evict = had_error || state.idle.len() >= self.idle_capacity;
        match conn {
            Some(conn) if !evict => {
                state.idle.push_back(conn);
                None
            }
            other => {
                state.total = state.total.saturating_sub(1);
                state.stats.connections_evicted += 1;
                other
            }
        }
    }

    /// Empty the idle queue for shutdown, handing the connections back for
    /// closing outside the lock.
    pub(crate) fn drain_idle(&self) -> Vec<T> {
        let mut state = self.lock();
        let drained: Vec<T> = state.idle.drain(..).collect();
        state.total = state.total.saturating_sub(drained.len());
        state.stats.connections_evicted += drained.len() as u64;
        drained
    }

    pub(crate) fn snapshot(&self) -> PoolStatus {
        let state = self.lock();
        PoolStatus {
            idle: state.idle.len(),
            total: state.total,
            outstanding: state.outstanding,
            stats: state.stats,
        }
    }
}
