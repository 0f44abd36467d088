use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::error::SqlDispatchError;

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

static FORCE_SPAWN_FAILURE: AtomicBool = AtomicBool::new(false);

/// Force every worker-thread spawn attempt to fail. Test hook.
pub fn set_force_spawn_failure_for_tests(force: bool) {
    FORCE_SPAWN_FAILURE.store(force, Ordering::SeqCst);
}

struct Shared {
    receiver: Mutex<Receiver<Job>>,
    live: AtomicUsize,
    idle: AtomicUsize,
}

/// Bounded set of worker threads draining one job queue.
///
/// Workers are spawned lazily: a submission only starts a thread when no
/// worker is idle and the live count is under `max_workers`. A failed spawn is
/// retried after a fixed backoff; when every attempt fails and no worker is
/// alive at all, the submission is rejected so the dispatcher can complete the
/// callable with a resource error instead of queueing it forever.
pub(crate) struct WorkerSet {
    sender: Mutex<Option<Sender<Job>>>,
    shared: Arc<Shared>,
    max_workers: usize,
    spawn_retries: u32,
    spawn_backoff: Duration,
    next_worker_id: AtomicU64,
}

impl WorkerSet {
    pub(crate) fn new(max_workers: usize, spawn_retries: u32, spawn_backoff: Duration) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender: Mutex::new(Some(sender)),
            shared: Arc::new(Shared {
                receiver: Mutex::new(receiver),
                live: AtomicUsize::new(0),
                idle: AtomicUsize::new(0),
            }),
            max_workers,
            spawn_retries,
            spawn_backoff,
            next_worker_id: AtomicU64::new(1),
        }
    }

    /// Queue a job, starting a worker thread first if none is free.
    ///
    /// # Errors
    /// Returns `SqlDispatchError::ResourceError` if the queue is shut down or
    /// no worker thread exists after the spawn attempts.
    pub(crate) fn submit(&self, job: Job) -> Result<(), SqlDispatchError> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            return Err(SqlDispatchError::ResourceError(
                "worker queue is shut down".into(),
            ));
        };

        if self.shared.idle.load(Ordering::Acquire) == 0
            && self.shared.live.load(Ordering::Acquire) < self.max_workers
        {
            self.spawn_with_retry();
        }

        if self.shared.live.load(Ordering::Acquire) == 0 {
            return Err(SqlDispatchError::ResourceError(format!(
                "no worker thread available after {} spawn attempts",
                self.spawn_retries + 1
            )));
        }

        sender.send(job).map_err(|_| {
            SqlDispatchError::ResourceError("worker queue closed while submitting".into())
        })?;
        Ok(())
    }

    fn spawn_with_retry(&self) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_spawn() {
                Ok(()) => return,
                Err(err) if attempt <= self.spawn_retries => {
                    tracing::warn!(
                        "error spawning worker thread on attempt #{attempt} [{err}], \
                         pausing {}ms and trying again",
                        self.spawn_backoff.as_millis()
                    );
                    thread::sleep(self.spawn_backoff);
                }
                Err(err) => {
                    tracing::warn!(
                        "error spawning worker thread on attempt #{attempt} [{err}], giving up"
                    );
                    return;
                }
            }
        }
    }

    fn try_spawn(&self) -> io::Result<()> {
        if FORCE_SPAWN_FAILURE.load(Ordering::SeqCst) {
            return Err(io::Error::other("spawn failure forced by test hook"));
        }

        let shared = Arc::clone(&self.shared);
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        // Count the worker live before it starts so a submission racing the
        // spawn never observes zero workers with a queued job.
        self.shared.live.fetch_add(1, Ordering::AcqRel);
        let spawned = thread::Builder::new()
            .name(format!("sql-dispatch-worker-{id}"))
            .spawn(move || worker_loop(&shared));
        if let Err(err) = spawned {
            self.shared.live.fetch_sub(1, Ordering::AcqRel);
            return Err(err);
        }
        Ok(())
    }

    /// Close the queue. Workers drain whatever is already queued, then exit.
    pub(crate) fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

fn worker_loop(shared: &Shared) {
    struct LiveGuard<'a>(&'a AtomicUsize);
    impl Drop for LiveGuard<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::AcqRel);
        }
    }
    // Decrements on unwind too, so a panicking query function cannot leave the
    // live count stuck above the number of real threads.
    let _live = LiveGuard(&shared.live);

    loop {
        shared.idle.fetch_add(1, Ordering::AcqRel);
        let job = {
            let receiver = shared
                .receiver
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            receiver.recv()
        };
        shared.idle.fetch_sub(1, Ordering::AcqRel);
        match job {
            Ok(job) => job(),
            Err(_) => break,
        }
    }
}
