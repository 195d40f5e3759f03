//! Endpoint — lifecycle facade
//!
//! Owns the listening socket, the pollers, the worker pool and the
//! handler reference, and exposes the lifecycle:
//! `init` -> `start` -> (`pause` / `resume`) -> `stop` -> `destroy`.
//! Out-of-order transitions are idempotent no-ops where safe.
//!
//! Dispatch policy: with no external executor, readiness is handed to a
//! pool worker through its mailbox, blocking while the pool is saturated
//! (back-pressure); with an executor configured, a one-shot task is
//! submitted instead and the pool is bypassed.

use crate::acceptor;
use crate::config::EndpointConfig;
use crate::handler::Handler;
use crate::poller::{Poller, PollerHandle};
use crate::sendfile::Sendfile;
use crate::socket::{Socket, SocketRef};
use crate::worker::{Job, WorkerPool};
use log::{debug, error, warn};
use netmux_core::error::{EndpointError, EndpointResult};
use netmux_core::state::SocketState;
use netmux_core::traits::Executor;
use socket2::{Domain, Protocol, SockRef, Socket as RawSocket, Type};
use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Bound on the loopback self-connect used to break `accept()`.
const UNLOCK_TIMEOUT: Duration = Duration::from_millis(250);

/// State shared by acceptor, poller and worker threads.
pub(crate) struct Core {
    pub(crate) config: EndpointConfig,
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) executor: Option<Arc<dyn Executor>>,
    pub(crate) running: AtomicBool,
    pub(crate) paused: AtomicBool,
    pub(crate) pool: WorkerPool,
    pollers: Mutex<Vec<PollerHandle>>,
    poller_rr: AtomicUsize,
}

impl Core {
    fn new(
        config: EndpointConfig,
        handler: Arc<dyn Handler>,
        executor: Option<Arc<dyn Executor>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            handler,
            executor,
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            pool: WorkerPool::new(),
            pollers: Mutex::new(Vec::new()),
            poller_rr: AtomicUsize::new(0),
        })
    }

    #[inline]
    pub(crate) fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Next poller, round-robin. The count is held at 1 in this release,
    /// so this is effectively "the poller", but registration is written
    /// against the general shape.
    pub(crate) fn poller(&self) -> Option<PollerHandle> {
        let pollers = self.lock_pollers();
        if pollers.is_empty() {
            return None;
        }
        let i = self.poller_rr.fetch_add(1, Ordering::Relaxed) % pollers.len();
        Some(pollers[i].clone())
    }

    /// Prepare an accepted connection and hand it to a poller.
    ///
    /// Non-blocking mode, then SO_LINGER and TCP_NODELAY per config,
    /// then registration. Returns false on any failure; the stream is
    /// dropped (closed) on every error path.
    pub(crate) fn configure_socket(
        self: &Arc<Self>,
        stream: std::net::TcpStream,
        peer: SocketAddr,
    ) -> bool {
        if let Err(e) = stream.set_nonblocking(true) {
            debug!("set_nonblocking failed for {}: {}", peer, e);
            return false;
        }

        {
            let raw = SockRef::from(&stream);
            if let Some(linger) = self.config.so_linger {
                if let Err(e) = raw.set_linger(Some(linger)) {
                    debug!("set_linger failed for {}: {}", peer, e);
                    return false;
                }
            }
            if self.config.tcp_nodelay {
                if let Err(e) = raw.set_nodelay(true) {
                    debug!("set_nodelay failed for {}: {}", peer, e);
                    return false;
                }
            }
        }

        // A TLS handshake would run here; no engine is wired into this
        // build (init already warned), so the stream stays plaintext.

        let stream = mio::net::TcpStream::from_std(stream);
        let Some(poller) = self.poller() else {
            debug!("no poller available for {}", peer);
            return false;
        };
        let socket = Socket::new(stream, peer, poller.clone());
        poller.register(socket);
        true
    }

    fn lock_pollers(&self) -> MutexGuard<'_, Vec<PollerHandle>> {
        self.pollers.lock().unwrap_or_else(|p| p.into_inner())
    }

    #[cfg(test)]
    pub(crate) fn for_tests(config: EndpointConfig, handler: Arc<dyn Handler>) -> Arc<Self> {
        Core::new(config, handler, None)
    }
}

/// Submit one readiness dispatch.
///
/// Returns false only on resource exhaustion (worker spawn failure,
/// executor rejection, or shutdown); the caller is responsible for
/// closing the socket in that case.
pub(crate) fn dispatch(core: &Arc<Core>, socket: SocketRef, event: bool, error: bool) -> bool {
    let job = Job {
        socket,
        event,
        error,
    };

    if let Some(executor) = &core.executor {
        let task_core = Arc::clone(core);
        match executor.execute(Box::new(move || run_job(&task_core, job))) {
            Ok(()) => true,
            Err(_) => {
                error!("dispatch failed: executor rejected the task");
                false
            }
        }
    } else {
        let worker = match core.pool.acquire(core) {
            Ok(worker) => worker,
            Err(e) => {
                error!("dispatch failed: {}", e);
                return false;
            }
        };
        // Hand-off through the one-slot mailbox; a rejection here means
        // the pool shut down underneath us.
        worker.mailbox.put(job).is_ok()
    }
}

/// Run one dispatch and act on the handler's verdict. Shared by pool
/// workers and external-executor tasks.
pub(crate) fn run_job(core: &Arc<Core>, job: Job) {
    let attachment = job.socket.attachment();
    attachment.set_current_access(true);
    let state = if job.event {
        core.handler.event(&job.socket, job.error)
    } else {
        core.handler.process(&job.socket)
    };
    attachment.set_current_access(false);

    match state {
        SocketState::Closed => job.socket.close(),
        SocketState::Open => job.socket.rearm(),
        SocketState::Long => {}
    }
}

/// A non-blocking TCP connection endpoint.
///
/// Accepts connections, multiplexes readiness across them with a single
/// selector, and delivers socket-processing events to the supplied
/// [`Handler`] from a bounded worker pool (or an external [`Executor`]).
pub struct Endpoint {
    config: EndpointConfig,
    handler: Arc<dyn Handler>,
    executor: Option<Arc<dyn Executor>>,
    core: Option<Arc<Core>>,
    listener: Option<Arc<TcpListener>>,
    sendfile: Option<Sendfile>,
    local: Option<SocketAddr>,
}

impl Endpoint {
    pub fn new(config: EndpointConfig, handler: Arc<dyn Handler>) -> Self {
        Self {
            config,
            handler,
            executor: None,
            core: None,
            listener: None,
            sendfile: None,
            local: None,
        }
    }

    /// Install an external executor. Takes effect at the next `start`;
    /// while set, the internal worker pool is bypassed entirely.
    pub fn set_executor(&mut self, executor: Arc<dyn Executor>) {
        self.executor = Some(executor);
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Bind the listening socket. Idempotent while initialized.
    ///
    /// The listener stays in blocking mode; the non-blocking discipline
    /// applies only to accepted sockets. Bind or selector failure is the
    /// one fatal path: the error propagates and the endpoint stays
    /// uninitialized.
    pub fn init(&mut self) -> EndpointResult<()> {
        if self.listener.is_some() {
            return Ok(());
        }

        // Normalize narrowed knobs before validating.
        if self.config.poller_threads != 1 {
            debug!(
                "poller_threads {} narrowed to 1",
                self.config.poller_threads
            );
            self.config.poller_threads = 1;
        }
        if self.config.use_sendfile {
            warn!("sendfile requested but no backend is available; disabling");
            self.config.use_sendfile = false;
        }
        if let Some(tls) = &self.config.tls {
            if tls.enabled() {
                warn!(
                    "tls engine '{}' configured but none is wired into this build; \
                     the listener stays plaintext",
                    tls.engine
                );
            }
        }
        self.config.validate()?;

        let addr = SocketAddr::new(self.config.address, self.config.port);
        let listener = bind_with_backlog(addr, self.config.backlog).map_err(EndpointError::Bind)?;
        self.local = Some(listener.local_addr().map_err(EndpointError::Bind)?);
        self.listener = Some(Arc::new(listener));
        let sendfile = Sendfile::new();
        sendfile.init();
        self.sendfile = Some(sendfile);
        debug!("endpoint bound to {}", self.local.unwrap_or(addr));
        Ok(())
    }

    /// Start acceptor and poller threads. Idempotent while running.
    pub fn start(&mut self) -> EndpointResult<()> {
        self.init()?;
        if self.is_running() {
            return Ok(());
        }

        let listener = match &self.listener {
            Some(listener) => Arc::clone(listener),
            None => return Err(EndpointError::NotRunning),
        };

        let core = Core::new(
            self.config.clone(),
            Arc::clone(&self.handler),
            self.executor.clone(),
        );

        if let Err(e) = Self::spawn_threads(&core, &listener) {
            core.running.store(false, Ordering::Release);
            core.pool.shutdown();
            for handle in core.lock_pollers().drain(..) {
                handle.destroy(core.config.poll_time);
            }
            return Err(e);
        }

        self.core = Some(core);
        Ok(())
    }

    fn spawn_threads(core: &Arc<Core>, listener: &Arc<TcpListener>) -> EndpointResult<()> {
        // Pollers first: acceptors need a registration target.
        for i in 0..core.config.poller_threads {
            let handle = Poller::start(Arc::clone(core), i)?;
            core.lock_pollers().push(handle);
        }
        for i in 0..core.config.acceptor_threads {
            acceptor::spawn(Arc::clone(core), Arc::clone(listener), i)?;
        }
        Ok(())
    }

    /// Stop accepting new connections. Already-registered connections
    /// keep being served. Breaks the blocked `accept()` with a loopback
    /// self-connect.
    pub fn pause(&mut self) {
        let Some(core) = &self.core else { return };
        if core.running() && !core.paused() {
            core.paused.store(true, Ordering::Release);
            self.unlock_accept();
        }
    }

    /// Resume accepting. Connections parked in the kernel backlog during
    /// the pause are picked up.
    pub fn resume(&mut self) {
        if let Some(core) = &self.core {
            if core.running() {
                core.paused.store(false, Ordering::Release);
            }
        }
    }

    /// Stop the endpoint: no dispatch begins after this returns, though
    /// in-flight handler calls run to completion. The listening socket
    /// stays bound until `destroy`.
    pub fn stop(&mut self) {
        let Some(core) = self.core.clone() else { return };
        if !core.running() {
            return;
        }
        core.running.store(false, Ordering::Release);
        self.unlock_accept();

        core.pool.shutdown();
        let handles: Vec<PollerHandle> = core.lock_pollers().drain(..).collect();
        for handle in &handles {
            handle.destroy(core.config.poll_time);
        }
        debug!("endpoint stopped");
    }

    /// Tear everything down and close the listening socket. The endpoint
    /// returns to the uninitialized state; `init` may be called again.
    pub fn destroy(&mut self) {
        self.stop();
        if let Some(sendfile) = &self.sendfile {
            sendfile.destroy();
        }
        self.listener = None;
        self.sendfile = None;
        self.local = None;
        self.core = None;
    }

    /// Break the acceptor out of a blocked `accept()` with a loopback
    /// connection to our own port.
    fn unlock_accept(&self) {
        let Some(addr) = self.local else { return };
        let target = if addr.ip().is_unspecified() {
            SocketAddr::new(IpAddr::from([127, 0, 0, 1]), addr.port())
        } else {
            addr
        };
        match std::net::TcpStream::connect_timeout(&target, UNLOCK_TIMEOUT) {
            Ok(stream) => {
                // Linger 0 tears the dummy connection down immediately.
                let _ = SockRef::from(&stream).set_linger(Some(Duration::ZERO));
            }
            Err(e) => debug!("accept unlock connect to {} failed: {}", target, e),
        }
    }

    // ── Observability ─────────────────────────────────────────────────

    /// Address the listener is actually bound to (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }

    /// Connections currently registered with the pollers.
    pub fn keep_alive_count(&self) -> usize {
        match &self.core {
            Some(core) => core
                .lock_pollers()
                .iter()
                .map(|h| h.keep_alive_count())
                .sum(),
            None => 0,
        }
    }

    /// Sockets queued on the sendfile sender (always 0 in this build).
    pub fn sendfile_count(&self) -> usize {
        self.sendfile
            .as_ref()
            .map_or(0, |s| s.sendfile_count())
    }

    /// The sendfile interface, once initialized. `add` declines every
    /// transmission in this build; see [`Sendfile`].
    pub fn sendfile(&self) -> Option<&Sendfile> {
        self.sendfile.as_ref()
    }

    /// Worker threads alive in the pool.
    pub fn current_thread_count(&self) -> usize {
        self.core.as_ref().map_or(0, |c| c.pool.current())
    }

    /// Worker threads currently processing a socket.
    pub fn current_threads_busy(&self) -> usize {
        self.core.as_ref().map_or(0, |c| c.pool.busy())
    }

    pub fn is_running(&self) -> bool {
        self.core.as_ref().map_or(false, |c| c.running())
    }

    pub fn is_paused(&self) -> bool {
        self.core.as_ref().map_or(false, |c| c.paused())
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Bind a blocking listener with an explicit backlog.
fn bind_with_backlog(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = RawSocket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog as i32)?;
    Ok(socket.into())
}
