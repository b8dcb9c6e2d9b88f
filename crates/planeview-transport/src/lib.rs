//! Connection plumbing for planeview channels.
//!
//! Provides the pieces a channel needs to reach its peer:
//! - [`Endpoint`] addressing by `(host, port)` plus ephemeral port lookup
//! - TCP accept/connect ([`TcpAcceptor`], [`connect`])
//! - The outbound [`Transport`] abstraction the protocol engine writes to
//!
//! This is the lowest layer of planeview. Everything else builds on top of
//! the types provided here.

pub mod endpoint;
pub mod error;
pub mod tcp;
pub mod traits;

pub use endpoint::{free_port, Endpoint, DEFAULT_HOST};
pub use error::{Result, TransportError};
pub use tcp::{connect, TcpAcceptor};
pub use traits::{QueueTransport, Transport};
