//! Correlated request/reply messaging between a driver process and a
//! display peer.
//!
//! [`CorrelatedChannel`] is the protocol engine: it pairs replies with
//! requests by correlation id, keeps at most one request in flight per id,
//! validates the connection-wide session token, and dispatches
//! peer-initiated requests to registered handlers. [`attach`],
//! [`connect`] and [`ChannelListener`] bind it to a live TCP stream.

pub mod channel;
pub mod connection;
pub mod connector;
pub mod control;
pub mod error;
pub mod listener;
pub mod session;

pub use channel::{
    AbortContext, AbortHandler, ChannelConfig, CorrelatedChannel, Dispatch, Handler,
    HandlerResult, ReplyCallback, Role,
};
pub use connection::{attach, attach_with, Connection};
pub use connector::{connect, connect_with_config};
pub use control::{
    is_reserved, FAULT_BAD_REQUEST, FAULT_HANDLER_FAILED, FAULT_UNREGISTERED_HANDLER,
    INITIALIZE_ID,
};
pub use error::{ChannelError, Result, SessionError};
pub use listener::ChannelListener;
pub use session::Session;
