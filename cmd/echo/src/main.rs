//! Echo server demo
//!
//! A TCP echo server on the netmux endpoint: one acceptor, one poller,
//! a bounded worker pool, keep-alive connections with an idle timeout.
//!
//! Usage:
//!     cargo run --release -p echo -- [port] [max_threads]
//!
//! Test with:
//!     # Correctness:
//!     echo "hello" | nc -q1 localhost 9900
//!
//!     # Quick load (from another terminal):
//!     for i in $(seq 1 100); do echo "ping $i" | nc -q0 localhost 9900 & done
//!
//! Tuning comes from NMX_* environment variables, see netmux's
//! EndpointConfig; NMX_LOG sets the log level (error..trace).

use log::{info, LevelFilter, Metadata, Record};
use netmux::{Endpoint, EndpointConfig, EndpointResult, Handler, SocketRef, SocketState};
use std::io::ErrorKind;
use std::sync::Arc;
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

struct EchoHandler;

impl Handler for EchoHandler {
    fn process(&self, socket: &SocketRef) -> SocketState {
        let mut buf = [0u8; 4096];
        loop {
            match socket.read(&mut buf) {
                Ok(0) => return SocketState::Closed,
                Ok(n) => {
                    if socket.write_all(&buf[..n]).is_err() {
                        return SocketState::Closed;
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    // Drained; wait for the next request
                    return SocketState::Open;
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(_) => return SocketState::Closed,
            }
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────────

fn run() -> EndpointResult<()> {
    let mut args = std::env::args().skip(1);
    let port: u16 = args.next().and_then(|a| a.parse().ok()).unwrap_or(9900);
    let max_threads: usize = args.next().and_then(|a| a.parse().ok()).unwrap_or(40);

    let config = EndpointConfig::from_env()
        .port(port)
        .max_threads(Some(max_threads))
        .so_timeout(Some(Duration::from_secs(30)))
        .name("echo");

    let mut endpoint = Endpoint::new(config, Arc::new(EchoHandler));
    endpoint.start()?;
    info!(
        "echo listening on {} (workers <= {})",
        endpoint.local_addr().map(|a| a.to_string()).unwrap_or_default(),
        max_threads
    );

    loop {
        std::thread::sleep(Duration::from_secs(5));
        info!(
            "keepalive:{} workers:{} busy:{}",
            endpoint.keep_alive_count(),
            endpoint.current_thread_count(),
            endpoint.current_threads_busy()
        );
    }
}

fn main() {
    init_logging();
    if let Err(e) = run() {
        eprintln!("echo: {}", e);
        std::process::exit(1);
    }
}
