//! Plane viewing between a driver process and a remote display.
//!
//! # Crate Structure
//!
//! - [`transport`] — TCP endpoints and the outbound transport abstraction
//! - [`frame`] — Length-prefixed framing, the message model and array codec
//! - [`channel`] — The correlated request/reply channel
//! - [`image`] — Image backends, the plane cache and the quantizer
//! - [`service`] — Handlers that serve cached planes over a channel

pub mod service;

/// Re-export transport types.
pub mod transport {
    pub use planeview_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use planeview_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use planeview_channel::*;
}

/// Re-export image types.
pub mod image {
    pub use planeview_image::*;
}

pub use service::PlaneService;
