use std::time::Duration;

use planeview_frame::Fault;

/// Session violations. Always fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The first frame on the connection carried no session token.
    #[error("bootstrap frame '{id}' has no session token")]
    Missing { id: String },

    /// A frame carried a token other than the established one.
    #[error("frame '{id}' carries a mismatched session token")]
    Mismatch { id: String },

    /// The token is empty or too long.
    #[error("invalid session token length: {0}")]
    InvalidLength(usize),
}

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] planeview_transport::TransportError),

    /// Frame-level error (framing, envelope or array decoding).
    #[error("frame error: {0}")]
    Frame(#[from] planeview_frame::FrameError),

    /// Session bootstrap or validation failed.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// The peer answered a request with an error reply.
    #[error("peer returned {0}")]
    Remote(Fault),

    /// No reply arrived within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The channel was closed before the request completed.
    #[error("channel closed: {0}")]
    Closed(String),

    /// The channel was aborted by an earlier protocol error.
    #[error("channel aborted by an earlier protocol error")]
    Aborted,
}

pub type Result<T> = std::result::Result<T, ChannelError>;
