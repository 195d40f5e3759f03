//! Acceptor — the blocking accept loop
//!
//! One or more threads blocked on the listening socket. Every accepted
//! connection is configured (non-blocking, socket options) and handed to
//! a poller for registration. No failure terminates the loop: a broken
//! connection is closed and logged, and the acceptor keeps accepting.
//!
//! While the endpoint is paused the acceptor sits in a sleep loop; the
//! endpoint breaks it out of a blocked `accept()` with a loopback
//! self-connect.

use crate::endpoint::Core;
use log::{debug, error};
use netmux_core::error::{EndpointError, EndpointResult};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How long a paused acceptor sleeps between flag checks.
const PAUSE_NAP: Duration = Duration::from_secs(1);

/// Spawn one acceptor thread.
pub(crate) fn spawn(
    core: Arc<Core>,
    listener: Arc<TcpListener>,
    index: usize,
) -> EndpointResult<()> {
    thread::Builder::new()
        .name(format!("{}-acceptor-{}", core.config.name, index))
        .spawn(move || run(core, listener))
        .map_err(|_| EndpointError::SpawnFailed("acceptor"))?;
    Ok(())
}

fn run(core: Arc<Core>, listener: Arc<TcpListener>) {
    while core.running() {
        while core.paused() && core.running() {
            thread::sleep(PAUSE_NAP);
        }
        if !core.running() {
            break;
        }

        match listener.accept() {
            Ok((stream, peer)) => {
                if !core.configure_socket(stream, peer) {
                    // configure_socket already logged; the stream was
                    // dropped (closed) on its error path.
                    debug!("connection from {} discarded", peer);
                }
            }
            Err(e) => {
                // Transient accept failures must never kill the acceptor.
                error!("accept failed: {}", e);
            }
        }
    }
    debug!("acceptor exiting");
}
