//! Display-ready planes from multi-dimensional image cubes.
//!
//! [`ChannelPlaneCache`] extracts one 2-D plane at a time from an
//! [`ImageBackend`] and keeps the most recent one until the requested index
//! changes or the backing resource is modified. [`quantize`] turns a plane
//! into fixed-width levels for pseudo-color display.

pub mod backend;
pub mod cache;
pub mod error;
pub mod plane;
pub mod quantize;
pub mod raw;
pub mod stats;

pub use backend::{CubeShape, ImageBackend, PlaneIndex, Region};
pub use cache::ChannelPlaneCache;
pub use error::{BackendError, QuantizeError, Result};
pub use plane::{Mask, PixelType, Plane};
pub use quantize::{quantize, PixelWidth, Quantized, Transfer, DEFAULT_EXPONENT_BASE};
pub use raw::RawCube;
pub use stats::Statistics;
