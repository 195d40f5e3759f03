//! # netmux
//!
//! A non-blocking TCP connection endpoint: the acceptor / poller / worker
//! machinery that turns one listening socket into a stream of
//! socket-processing events delivered to a pluggable [`Handler`].
//!
//! The endpoint mediates between the kernel and a request processor:
//! readiness notification through a single selector per poller,
//! per-connection idle timeouts, keep-alive tracking, a bounded worker
//! pool with back-pressure, comet (long-poll) parking, and a lifecycle
//! (`init` / `start` / `pause` / `resume` / `stop` / `destroy`) that
//! cleanly quiesces in-flight work.
//!
//! Unix only: readiness is multiplexed with `mio` and sockets are
//! registered by file descriptor.
//!
//! ## Example
//!
//! ```ignore
//! use netmux::{Endpoint, EndpointConfig, Handler, SocketRef, SocketState};
//! use std::sync::Arc;
//!
//! struct EchoHandler;
//!
//! impl Handler for EchoHandler {
//!     fn process(&self, socket: &SocketRef) -> SocketState {
//!         let mut buf = [0u8; 4096];
//!         match socket.read(&mut buf) {
//!             Ok(0) => SocketState::Closed,
//!             Ok(n) => {
//!                 let _ = socket.write_all(&buf[..n]);
//!                 SocketState::Open
//!             }
//!             Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => SocketState::Open,
//!             Err(_) => SocketState::Closed,
//!         }
//!     }
//! }
//!
//! let mut endpoint = Endpoint::new(
//!     EndpointConfig::from_env().port(9000),
//!     Arc::new(EchoHandler),
//! );
//! endpoint.start()?;
//! # Ok::<(), netmux::EndpointError>(())
//! ```

mod acceptor;
pub mod config;
mod endpoint;
mod handler;
mod poller;
pub mod sendfile;
mod socket;
mod worker;

// Re-exports
pub use config::{EndpointConfig, TlsConfig, VerifyMode};
pub use endpoint::Endpoint;
pub use handler::Handler;
pub use sendfile::{Sendfile, SendfileData};
pub use socket::{Socket, SocketRef};

// Core types embedders need alongside the endpoint
pub use netmux_core::attachment::Attachment;
pub use netmux_core::error::{EndpointError, EndpointResult, TaskRejected};
pub use netmux_core::state::SocketState;
pub use netmux_core::traits::Executor;
