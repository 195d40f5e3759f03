//! Long-poll (comet) demo
//!
//! Every request parks on the server until the next broadcast tick,
//! then receives one event line. The socket never busy-waits: it sits
//! in the selector with no read interest while parked, and comes back
//! through `Handler::event` once re-armed.
//!
//! Usage:
//!     cargo run --release -p longpoll -- [port]
//!
//! Test with:
//!     nc localhost 9901        # type a line, wait for the next tick
//!
//! NMX_LOG sets the log level (error..trace).

use log::{debug, info, LevelFilter, Metadata, Record};
use netmux::{Endpoint, EndpointConfig, EndpointResult, Handler, SocketRef, SocketState};
use std::io::ErrorKind;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Logging ──────────────────────────────────────────────────────────

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        eprintln!("[{:<5}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging() {
    let level = match std::env::var("NMX_LOG").as_deref() {
        Ok("off") => LevelFilter::Off,
        Ok("error") => LevelFilter::Error,
        Ok("warn") => LevelFilter::Warn,
        Ok("debug") => LevelFilter::Debug,
        Ok("trace") => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };
    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(level));
}

// ── Handler ──────────────────────────────────────────────────────────

/// Connections waiting for the next broadcast.
type Waiters = Arc<Mutex<Vec<SocketRef>>>;

struct LongPollHandler {
    waiters: Waiters,
}

impl LongPollHandler {
    /// Consume the request bytes and park the connection.
    fn park(&self, socket: &SocketRef) -> SocketState {
        let mut buf = [0u8; 1024];
        match socket.read(&mut buf) {
            Ok(0) => return SocketState::Closed,
            Ok(_) => {}
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(_) => return SocketState::Closed,
        }
        socket.attachment().set_comet(true);
        self.waiters.lock().unwrap().push(Arc::clone(socket));
        debug!("parked {}", socket.peer_addr());
        SocketState::Long
    }
}

impl Handler for LongPollHandler {
    fn process(&self, socket: &SocketRef) -> SocketState {
        self.park(socket)
    }

    fn event(&self, socket: &SocketRef, error: bool) -> SocketState {
        if error {
            debug!("dropping {}", socket.peer_addr());
            return SocketState::Closed;
        }
        // The next request on a kept connection parks again.
        self.park(socket)
    }
}

/// Answer every parked connection, then re-arm it so its next request
/// comes back as an event.
fn broadcast(waiters: &Waiters, seq: u64) {
    let parked: Vec<SocketRef> = waiters.lock().unwrap().drain(..).collect();
    for socket in parked {
        if socket.write_all(format!("event {}\n", seq).as_bytes()).is_ok() {
            socket.rearm();
        }
        // A failed write leaves the connection parked with no interest;
        // the idle scan reaps it.
    }
}

// ── Main ─────────────────────────────────────────────────────────────

fn run() -> EndpointResult<()> {
    let port: u16 = std::env::args()
        .nth(1)
        .and_then(|a| a.parse().ok())
        .unwrap_or(9901);

    let waiters: Waiters = Arc::new(Mutex::new(Vec::new()));
    let config = EndpointConfig::from_env()
        .port(port)
        .so_timeout(Some(Duration::from_secs(120)))
        .name("longpoll");

    let mut endpoint = Endpoint::new(
        config,
        Arc::new(LongPollHandler {
            waiters: Arc::clone(&waiters),
        }),
    );
    endpoint.start()?;
    info!(
        "longpoll listening on {}",
        endpoint.local_addr().map(|a| a.to_string()).unwrap_or_default()
    );

    let mut seq = 0u64;
    loop {
        std::thread::sleep(Duration::from_secs(2));
        seq += 1;
        let waiting = waiters.lock().unwrap().len();
        if waiting > 0 {
            info!("tick {} -> {} waiter(s)", seq, waiting);
        }
        broadcast(&waiters, seq);
    }
}

fn main() {
    init_logging();
    if let Err(e) = run() {
        eprintln!("longpoll: {}", e);
        std::process::exit(1);
    }
}
