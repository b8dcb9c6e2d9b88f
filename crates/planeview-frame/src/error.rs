/// Errors that can occur during frame and payload encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x5056 \"PV\")")]
    InvalidMagic,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,

    /// The frame payload is not valid JSON or does not form an envelope.
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),

    /// An embedded array has an unknown dtype or inconsistent shape/data.
    #[error("invalid array: {0}")]
    InvalidArray(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
