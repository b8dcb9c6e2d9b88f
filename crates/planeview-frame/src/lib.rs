//! Framing and payload encoding for planeview channels.
//!
//! Two layers live here:
//! - Byte framing: every frame on the wire is a 2-byte magic ("PV") and a
//!   4-byte little-endian payload length, followed by the payload.
//!   [`FrameCodec`] plugs this into `tokio_util::codec`.
//! - Payloads: the [`Envelope`] carried inside each frame, its [`Value`]
//!   message model, and the array codec that turns embedded [`NdArray`]s
//!   into a self-describing `{dtype, shape, data}` form and back.

pub mod array;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod pack;
pub mod value;

pub use array::{DType, NdArray};
pub use codec::{decode_frame, encode_frame, FrameCodec, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use envelope::{Envelope, Fault, Origin};
pub use error::{FrameError, Result};
pub use pack::{pack, unpack};
pub use value::Value;
