use std::io;
use std::path::PathBuf;

use crate::backend::CubeShape;

/// Errors from image backends and the plane cache.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Failed to open an image or mask resource.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The resource is not a valid cube file.
    #[error("invalid cube file {path}: {reason}")]
    InvalidFormat { path: PathBuf, reason: String },

    /// The mask does not have exactly the image's shape.
    #[error("mask shape {mask} does not match image shape {image}")]
    MaskShape { image: CubeShape, mask: CubeShape },

    /// A region or plane does not fit the cube.
    #[error("region out of bounds: {0}")]
    OutOfBounds(String),

    /// Pixel buffer length does not match the declared plane size.
    #[error("plane of {width}x{height} needs {expected} pixels, got {actual}")]
    PlaneSize {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    /// I/O error while reading or writing pixels.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Plane could not be converted to a wire array.
    #[error("array error: {0}")]
    Array(#[from] planeview_frame::FrameError),
}

/// Errors from quantizer configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuantizeError {
    #[error("unknown transfer function '{0}'")]
    UnknownTransfer(String),

    #[error("invalid argument for transfer '{transfer}': {reason}")]
    InvalidArgument {
        transfer: &'static str,
        reason: String,
    },

    #[error("unsupported pixel width {0}; expected 8, 16 or 32")]
    UnsupportedWidth(u32),
}

pub type Result<T> = std::result::Result<T, BackendError>;
