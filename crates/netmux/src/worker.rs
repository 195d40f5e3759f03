//! Worker threads and the bounded worker pool
//!
//! Workers are long-lived threads that block on a one-slot [`Mailbox`],
//! dispatch the assigned socket to the handler, act on the verdict, and
//! return themselves to the pool. The pool is a LIFO stack of idle
//! workers (the most recently used worker has the warmest caches) plus
//! `(current, busy)` counters behind one mutex; it grows lazily up to
//! `max_threads` and blocks requesters when saturated, which is the
//! endpoint's back-pressure point.

use crate::endpoint::{self, Core};
use crate::socket::SocketRef;
use netmux_core::error::{EndpointError, EndpointResult};
use netmux_core::mailbox::Mailbox;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

/// One dispatch: a socket plus how the handler should see it.
pub(crate) struct Job {
    pub socket: SocketRef,
    /// Event (comet) dispatch rather than a normal one.
    pub event: bool,
    /// For event dispatches: the readiness arose from cancellation or
    /// failure, not data.
    pub error: bool,
}

/// A pool worker: just its mailbox. The thread itself is detached and
/// exits when the mailbox closes or the endpoint stops.
pub(crate) struct Worker {
    pub(crate) mailbox: Mailbox<Job>,
}

struct PoolInner {
    /// Idle workers, LIFO.
    idle: Vec<Arc<Worker>>,
    /// Every worker ever spawned; used to close mailboxes at shutdown.
    all: Vec<Arc<Worker>>,
    /// Threads alive.
    current: usize,
    /// Threads currently holding a socket.
    busy: usize,
    /// Name sequence.
    next_id: usize,
    shutdown: bool,
}

impl PoolInner {
    // 0 <= busy <= current <= max_threads, checked at every release.
    fn check(&self, max_threads: Option<usize>) {
        debug_assert!(self.busy <= self.current);
        if let Some(max) = max_threads {
            debug_assert!(self.current <= max);
        }
    }
}

/// Bounded, lazily growing worker pool.
pub(crate) struct WorkerPool {
    inner: Mutex<PoolInner>,
    returned: Condvar,
}

impl WorkerPool {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                idle: Vec::new(),
                all: Vec::new(),
                current: 0,
                busy: 0,
                next_id: 0,
                shutdown: false,
            }),
            returned: Condvar::new(),
        }
    }

    /// Get a worker, blocking until one is available.
    ///
    /// Pops an idle worker if any; otherwise spawns a new one while under
    /// `max_threads` (unbounded when `None`); otherwise waits for a
    /// recycle. `busy` is pre-incremented on every success path.
    pub(crate) fn acquire(&self, core: &Arc<Core>) -> EndpointResult<Arc<Worker>> {
        let mut inner = self.lock();
        loop {
            if inner.shutdown {
                return Err(EndpointError::NotRunning);
            }

            if let Some(worker) = inner.idle.pop() {
                inner.busy += 1;
                inner.check(core.config.max_threads);
                return Ok(worker);
            }

            let can_grow = match core.config.max_threads {
                None => true,
                Some(max) => inner.current < max,
            };
            if can_grow {
                let worker = Arc::new(Worker {
                    mailbox: Mailbox::new(),
                });
                let id = inner.next_id;
                inner.next_id += 1;

                let spawned = thread::Builder::new()
                    .name(format!("{}-worker-{}", core.config.name, id))
                    .spawn({
                        let core = Arc::clone(core);
                        let worker = Arc::clone(&worker);
                        move || run_worker(core, worker)
                    });
                match spawned {
                    Ok(_) => {
                        inner.current += 1;
                        inner.busy += 1;
                        inner.all.push(Arc::clone(&worker));
                        inner.check(core.config.max_threads);
                        return Ok(worker);
                    }
                    Err(_) => return Err(EndpointError::SpawnFailed("worker")),
                }
            }

            inner = self.wait(inner);
        }
    }

    /// Return a worker to the idle stack and signal one waiter.
    pub(crate) fn recycle(&self, worker: Arc<Worker>) {
        let mut inner = self.lock();
        if inner.shutdown {
            return;
        }
        inner.busy = inner.busy.saturating_sub(1);
        inner.idle.push(worker);
        self.returned.notify_one();
    }

    /// Close every mailbox and wake all waiters. Workers finish their
    /// in-flight handler call (if any) and exit.
    pub(crate) fn shutdown(&self) {
        let mut inner = self.lock();
        inner.shutdown = true;
        for worker in &inner.all {
            worker.mailbox.close();
        }
        inner.idle.clear();
        self.returned.notify_all();
    }

    pub(crate) fn current(&self) -> usize {
        self.lock().current
    }

    pub(crate) fn busy(&self) -> usize {
        self.lock().busy
    }

    fn worker_exited(&self) {
        let mut inner = self.lock();
        inner.current = inner.current.saturating_sub(1);
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, PoolInner>) -> MutexGuard<'a, PoolInner> {
        self.returned
            .wait(guard)
            .unwrap_or_else(|p| p.into_inner())
    }
}

/// The worker loop: take, check the endpoint is still running, dispatch,
/// act on the verdict, recycle. A closed mailbox is the exit signal.
fn run_worker(core: Arc<Core>, me: Arc<Worker>) {
    while core.running() {
        let Some(job) = me.mailbox.take() else {
            break;
        };
        if !core.running() {
            // Assigned before the stop landed; never starts a handler
            // call after shutdown.
            job.socket.close();
            break;
        }
        endpoint::run_job(&core, job);
        core.pool.recycle(Arc::clone(&me));
    }
    core.pool.worker_exited();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::handler::Handler;
    use netmux_core::state::SocketState;
    use std::time::Duration;

    struct NullHandler;

    impl Handler for NullHandler {
        fn process(&self, _socket: &SocketRef) -> SocketState {
            SocketState::Closed
        }
    }

    fn test_core(max_threads: Option<usize>) -> Arc<Core> {
        Core::for_tests(
            EndpointConfig::new().max_threads(max_threads).name("wp"),
            Arc::new(NullHandler),
        )
    }

    #[test]
    fn test_grows_lazily_and_recycles() {
        let core = test_core(Some(4));
        let w1 = core.pool.acquire(&core).unwrap();
        let w2 = core.pool.acquire(&core).unwrap();
        assert_eq!(core.pool.current(), 2);
        assert_eq!(core.pool.busy(), 2);

        core.pool.recycle(w2);
        assert_eq!(core.pool.busy(), 1);

        // LIFO: the recycled worker comes straight back
        let w3 = core.pool.acquire(&core).unwrap();
        assert_eq!(core.pool.current(), 2);
        assert_eq!(core.pool.busy(), 2);

        core.pool.recycle(w1);
        core.pool.recycle(w3);
        assert_eq!(core.pool.busy(), 0);
        core.pool.shutdown();
    }

    #[test]
    fn test_acquire_blocks_at_cap_until_recycle() {
        let core = test_core(Some(1));
        let w1 = core.pool.acquire(&core).unwrap();

        let core2 = Arc::clone(&core);
        let blocked = thread::spawn(move || core2.pool.acquire(&core2).map(|_| ()));

        thread::sleep(Duration::from_millis(100));
        assert!(!blocked.is_finished());
        assert_eq!(core.pool.current(), 1);

        core.pool.recycle(w1);
        assert!(blocked.join().unwrap().is_ok());
        core.pool.shutdown();
    }

    #[test]
    fn test_unbounded_growth() {
        let core = test_core(None);
        let mut held = Vec::new();
        for _ in 0..8 {
            held.push(core.pool.acquire(&core).unwrap());
        }
        assert_eq!(core.pool.current(), 8);
        for w in held {
            core.pool.recycle(w);
        }
        core.pool.shutdown();
    }

    #[test]
    fn test_shutdown_rejects_acquire() {
        let core = test_core(Some(2));
        core.pool.shutdown();
        assert!(matches!(
            core.pool.acquire(&core),
            Err(EndpointError::NotRunning)
        ));
    }

    #[test]
    fn test_shutdown_unblocks_waiter() {
        let core = test_core(Some(1));
        let _w1 = core.pool.acquire(&core).unwrap();

        let core2 = Arc::clone(&core);
        let blocked = thread::spawn(move || core2.pool.acquire(&core2).map(|_| ()));
        thread::sleep(Duration::from_millis(50));

        core.pool.shutdown();
        assert!(blocked.join().unwrap().is_err());
    }
}
