//! Poller — the selector-owning event loop
//!
//! One thread per poller. It is the only thread allowed to touch the
//! selector, the connection table, or interest state; everything else
//! (acceptors, workers, parked handler threads) communicates by pushing
//! a [`PollerEvent`] onto the shared FIFO and waking the selector. This
//! confinement is the core invariant of the whole endpoint: selector
//! state is never mutated concurrently.
//!
//! Each loop iteration: drain the event FIFO, select, dispatch readiness
//! one-shot (interest is dropped before the socket is handed to a
//! worker), then run the idle-timeout scan over armed connections.

use crate::endpoint::{self, Core};
use crate::socket::{SocketRef, TOKEN_NONE};
use crossbeam_queue::SegQueue;
use log::{debug, error, warn};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};
use netmux_core::attachment::now_millis;
use netmux_core::error::{EndpointError, EndpointResult};
use slab::Slab;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Token reserved for the cross-thread waker.
const WAKER_TOKEN: Token = Token(0);

/// Connection tokens start above the waker token.
const TOKEN_BASE: usize = 1;

/// Capacity of the readiness event buffer per selection.
const EVENTS_CAPACITY: usize = 1024;

/// Bound on how long `destroy` waits for the loop to acknowledge.
const DESTROY_DRAIN_WAIT: Duration = Duration::from_millis(500);

/// Deferred actions executed on the poller thread, in FIFO order, before
/// the next selection.
pub(crate) enum PollerEvent {
    /// New connection: insert, arm read interest.
    Register(SocketRef),
    /// A processed connection returns to the poller awaiting more data.
    Rearm(SocketRef),
    /// Remove the connection and drop the poller's reference.
    Close(SocketRef),
}

/// State shared between the poller thread and its handle holders.
struct PollerShared {
    events: SegQueue<PollerEvent>,
    waker: Waker,
    close: AtomicBool,
    keep_alive: AtomicUsize,
    done: Mutex<bool>,
    done_cond: Condvar,
}

/// Cheap cloneable handle external threads use to talk to a poller.
#[derive(Clone)]
pub(crate) struct PollerHandle {
    shared: Arc<PollerShared>,
}

impl PollerHandle {
    /// Queue a freshly configured connection for registration.
    pub(crate) fn register(&self, socket: SocketRef) {
        if self.closing() {
            socket.shutdown_now();
            return;
        }
        self.push(PollerEvent::Register(socket));
    }

    /// Queue a read-interest re-arm for an already registered connection.
    pub(crate) fn rearm(&self, socket: SocketRef) {
        if self.closing() {
            socket.release_parker();
            socket.shutdown_now();
            return;
        }
        self.push(PollerEvent::Rearm(socket));
    }

    /// Queue removal of a connection the core has closed. The caller has
    /// already shut the stream down, so on a closing poller there is
    /// nothing left to do.
    pub(crate) fn close(&self, socket: SocketRef) {
        if self.closing() {
            return;
        }
        self.push(PollerEvent::Close(socket));
    }

    fn closing(&self) -> bool {
        self.shared.close.load(Ordering::Acquire)
    }

    /// Number of connections currently registered (keep-alive set).
    pub(crate) fn keep_alive_count(&self) -> usize {
        self.shared.keep_alive.load(Ordering::Relaxed)
    }

    /// Stop the poller: give an in-flight selection a moment to finish
    /// (bounded by the poll interval), then raise the close flag and
    /// wake the loop, and wait briefly for the drain to complete.
    pub(crate) fn destroy(&self, poll_time: Duration) {
        let grace = Duration::from_millis(((poll_time.as_micros() / 1000) as u64).max(1));
        self.wait_done(grace);
        self.shared.close.store(true, Ordering::Release);
        self.wake();
        self.wait_done(DESTROY_DRAIN_WAIT);
    }

    fn push(&self, event: PollerEvent) {
        self.shared.events.push(event);
        self.wake();
    }

    fn wake(&self) {
        if let Err(e) = self.shared.waker.wake() {
            debug!("poller wake failed: {}", e);
        }
    }

    fn wait_done(&self, timeout: Duration) {
        let mut done = self
            .shared
            .done
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        let deadline = Instant::now() + timeout;
        while !*done {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            let (guard, _) = self
                .shared
                .done_cond
                .wait_timeout(done, deadline - now)
                .unwrap_or_else(|p| p.into_inner());
            done = guard;
        }
    }
}

/// One registered connection as the poller sees it.
struct Entry {
    socket: SocketRef,
    /// Read interest currently armed. Cleared before every dispatch
    /// (one-shot readiness); only armed connections are eligible for the
    /// idle-timeout scan, since a disarmed one is owned by a worker or
    /// parked on purpose.
    armed: bool,
}

/// The selector-owning side. Lives entirely on the poller thread.
pub(crate) struct Poller {
    core: Arc<Core>,
    shared: Arc<PollerShared>,
    poll: Poll,
    conns: Slab<Entry>,
}

impl Poller {
    /// Create the selector and spawn the poller thread.
    pub(crate) fn start(core: Arc<Core>, index: usize) -> EndpointResult<PollerHandle> {
        let poll = Poll::new().map_err(EndpointError::Selector)?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN).map_err(EndpointError::Selector)?;

        let shared = Arc::new(PollerShared {
            events: SegQueue::new(),
            waker,
            close: AtomicBool::new(false),
            keep_alive: AtomicUsize::new(0),
            done: Mutex::new(false),
            done_cond: Condvar::new(),
        });
        let handle = PollerHandle {
            shared: Arc::clone(&shared),
        };

        let name = format!("{}-poller-{}", core.config.name, index);
        let mut poller = Poller {
            core,
            shared,
            poll,
            conns: Slab::new(),
        };
        thread::Builder::new()
            .name(name)
            .spawn(move || poller.run())
            .map_err(|_| EndpointError::SpawnFailed("poller"))?;

        Ok(handle)
    }

    fn run(&mut self) {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        let timeout = self.core.config.selector_timeout;

        loop {
            self.drain_events();

            if self.shared.close.load(Ordering::Acquire) || !self.core.running() {
                break;
            }

            match self.poll.poll(&mut events, Some(timeout)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("selection failed: {}", e);
                    continue;
                }
            }

            // Snapshot tokens first; dispatch needs &mut self.
            let ready: Vec<(usize, bool)> = events
                .iter()
                .filter(|ev| ev.token() != WAKER_TOKEN)
                .map(|ev| {
                    let readable =
                        ev.is_readable() || ev.is_read_closed() || ev.is_error();
                    (ev.token().0 - TOKEN_BASE, readable)
                })
                .collect();

            for (key, readable) in ready {
                self.handle_ready(key, readable);
            }

            self.idle_scan();
        }

        self.teardown();
    }

    /// Apply every queued action, oldest first. A failure in one action
    /// is logged and the drain continues.
    fn drain_events(&mut self) {
        while let Some(event) = self.shared.events.pop() {
            match event {
                PollerEvent::Register(socket) => self.apply_register(socket),
                PollerEvent::Rearm(socket) => self.apply_rearm(socket),
                PollerEvent::Close(socket) => self.apply_close(socket),
            }
        }
    }

    fn apply_register(&mut self, socket: SocketRef) {
        if self.conns.len() >= self.core.config.poller_size {
            warn!(
                "poller at capacity ({}), refusing connection from {}",
                self.core.config.poller_size,
                socket.peer_addr()
            );
            socket.shutdown_now();
            return;
        }

        socket.attachment().access();
        socket.attachment().set_wake_up(false);
        let fd = socket.raw_fd();
        let key = self.conns.insert(Entry {
            socket: Arc::clone(&socket),
            armed: true,
        });
        socket.set_registered_token(key);

        match self.poll.registry().register(
            &mut SourceFd(&fd),
            Token(key + TOKEN_BASE),
            Interest::READABLE,
        ) {
            Ok(()) => {
                self.shared.keep_alive.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                debug!("register failed for {}: {}", socket.peer_addr(), e);
                self.conns.remove(key);
                socket.set_registered_token(TOKEN_NONE);
                socket.shutdown_now();
            }
        }
    }

    fn apply_rearm(&mut self, socket: SocketRef) {
        let key = socket.registered_token();
        let live = key != TOKEN_NONE
            && self
                .conns
                .get(key)
                .map_or(false, |e| Arc::ptr_eq(&e.socket, &socket));
        if !live {
            // The connection was cancelled underneath the caller.
            debug!("re-arm on a cancelled connection from {}", socket.peer_addr());
            socket.release_parker();
            socket.shutdown_now();
            return;
        }

        let armed = self.conns[key].armed;
        if armed {
            return;
        }

        socket.attachment().access();
        let fd = socket.raw_fd();
        match self.poll.registry().register(
            &mut SourceFd(&fd),
            Token(key + TOKEN_BASE),
            Interest::READABLE,
        ) {
            Ok(()) => self.conns[key].armed = true,
            Err(e) => {
                debug!("re-arm failed for {}: {}", socket.peer_addr(), e);
                self.close_key(key);
                socket.shutdown_now();
            }
        }
    }

    fn apply_close(&mut self, socket: SocketRef) {
        let key = socket.registered_token();
        if key != TOKEN_NONE
            && self
                .conns
                .get(key)
                .map_or(false, |e| Arc::ptr_eq(&e.socket, &socket))
        {
            self.close_key(key);
        }
    }

    /// One readiness delivery. Interest is dropped first (one-shot): the
    /// socket will not fire again until the worker or handler re-arms it,
    /// so the worker owns it exclusively until then.
    fn handle_ready(&mut self, key: usize, readable: bool) {
        let socket = match self.conns.get(key) {
            Some(entry) if entry.armed => Arc::clone(&entry.socket),
            // Removed or already dispatched within this batch.
            _ => return,
        };

        let att = socket.attachment();
        att.access();
        self.disarm(key);

        if readable {
            if att.wake_up() {
                // A handler thread is parked on this connection; release
                // it instead of dispatching.
                att.set_wake_up(false);
                att.unpark();
            } else if att.comet() && self.core.config.use_comet {
                if !endpoint::dispatch(&self.core, Arc::clone(&socket), true, false)
                    && !endpoint::dispatch(&self.core, Arc::clone(&socket), true, true)
                {
                    self.close_key(key);
                    socket.shutdown_now();
                }
            } else if !endpoint::dispatch(&self.core, Arc::clone(&socket), false, false) {
                self.close_key(key);
                socket.shutdown_now();
            }
        }
        // Write readiness is never armed in this release.
    }

    /// Cancel every armed connection whose idle time exceeds the
    /// configured socket timeout. Disarmed connections are exempt: they
    /// are either being processed or deliberately parked.
    fn idle_scan(&mut self) {
        let Some(timeout) = self.core.config.so_timeout else {
            return;
        };
        let limit = timeout.as_millis() as u64;
        let now = now_millis();

        let expired: Vec<usize> = self
            .conns
            .iter()
            .filter(|(_, e)| e.armed && e.socket.attachment().idle_millis(now) > limit)
            .map(|(key, _)| key)
            .collect();

        for key in expired {
            self.cancel(key);
        }
    }

    /// Cancel a connection: remove it from the selector, shut the
    /// stream down, and deliver a comet error event if the registration
    /// asked for one. The wake-up flag takes precedence over the error
    /// event: a set flag means a worker is parked on this socket, and
    /// dispatching to a second worker would give the socket two owners.
    /// The parker is released instead and observes the shutdown on its
    /// next read.
    fn cancel(&mut self, key: usize) {
        let socket = match self.conns.get(key) {
            Some(entry) => Arc::clone(&entry.socket),
            None => return,
        };
        debug!("cancelling idle connection from {}", socket.peer_addr());

        let comet = socket.attachment().comet();
        self.close_key(key);
        socket.shutdown_now();

        if socket.attachment().wake_up() {
            socket.release_parker();
        } else if comet && self.core.config.use_comet {
            let _ = endpoint::dispatch(&self.core, socket, true, true);
        }
    }

    /// Common removal tail: selector, table, counter. The stream itself
    /// is not shut down here: an in-flight worker may still be writing,
    /// and the descriptor closes when the last reference drops.
    fn close_key(&mut self, key: usize) {
        if !self.conns.contains(key) {
            return;
        }
        self.disarm(key);
        let entry = self.conns.remove(key);
        self.shared.keep_alive.fetch_sub(1, Ordering::Relaxed);
        entry.socket.set_registered_token(TOKEN_NONE);
    }

    fn disarm(&mut self, key: usize) {
        let entry = match self.conns.get_mut(key) {
            Some(entry) if entry.armed => entry,
            _ => return,
        };
        entry.armed = false;
        let fd = entry.socket.raw_fd();
        if let Err(e) = self.poll.registry().deregister(&mut SourceFd(&fd)) {
            debug!("deregister failed: {}", e);
        }
    }

    /// Close every key still registered and report the loop finished.
    fn teardown(&mut self) {
        // Mark closed even when the exit came from the running flag, so
        // handle holders stop queueing.
        self.shared.close.store(true, Ordering::Release);

        let keys: Vec<usize> = self.conns.iter().map(|(key, _)| key).collect();
        for key in keys {
            if let Some(entry) = self.conns.get(key) {
                entry.socket.release_parker();
            }
            self.close_key(key);
        }

        // Events that raced with the close flag would otherwise pin
        // their sockets in a queue nobody drains.
        while let Some(event) = self.shared.events.pop() {
            match event {
                PollerEvent::Register(socket) | PollerEvent::Rearm(socket) => {
                    socket.release_parker();
                    socket.shutdown_now();
                }
                PollerEvent::Close(_) => {}
            }
        }

        let mut done = self
            .shared
            .done
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        *done = true;
        self.shared.done_cond.notify_all();
        debug!("poller exiting");
    }
}
