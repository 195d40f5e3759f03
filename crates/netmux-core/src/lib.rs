//! # netmux-core
//!
//! Core types and primitives for the netmux non-blocking TCP endpoint.
//!
//! This crate is selector-agnostic and contains no socket code.
//! The endpoint runtime (acceptor, poller, worker pool) lives in `netmux`.
//!
//! ## Modules
//!
//! - `state` - Handler verdict for a processed socket
//! - `attachment` - Per-connection shared state (access stamp, comet, parking)
//! - `mailbox` - One-slot rendezvous between a producer and one worker
//! - `traits` - External executor seam
//! - `error` - Error types
//! - `env` - Environment variable utilities

pub mod attachment;
pub mod env;
pub mod error;
pub mod mailbox;
pub mod state;
pub mod traits;

// Re-exports for convenience
pub use attachment::{now_millis, Attachment};
pub use error::{EndpointError, EndpointResult, TaskRejected};
pub use mailbox::Mailbox;
pub use state::SocketState;
pub use traits::Executor;
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str};
