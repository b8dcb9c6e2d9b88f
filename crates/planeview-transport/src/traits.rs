use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{Result, TransportError};

/// Outbound half of a duplex, message-oriented connection.
///
/// `send` hands one encoded frame to the connection and must not block on
/// network I/O: the protocol engine calls it while holding its dispatch lock
/// so that per-id ordering is decided and enacted atomically.
pub trait Transport: Send + Sync {
    /// Queue one frame for transmission.
    fn send(&self, frame: Bytes) -> Result<()>;

    /// Stop accepting frames. Frames already queued are still delivered.
    fn close(&self);

    /// Whether [`Transport::close`] has been called.
    fn is_closed(&self) -> bool;
}

/// [`Transport`] backed by an unbounded in-process queue.
///
/// The receiving end is drained by a writer task (see the connection driver
/// in `planeview-channel`) or inspected directly in tests.
pub struct QueueTransport {
    tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
}

impl QueueTransport {
    /// Create a transport and the receiver its frames arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl Transport for QueueTransport {
    fn send(&self, frame: Bytes) -> Result<()> {
        let guard = self.tx.lock().map_err(|_| TransportError::Shutdown)?;
        let tx = guard.as_ref().ok_or(TransportError::Shutdown)?;
        tx.send(frame).map_err(|_| TransportError::Shutdown)
    }

    fn close(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
    }

    fn is_closed(&self) -> bool {
        match self.tx.lock() {
            Ok(guard) => guard.as_ref().map_or(true, |tx| tx.is_closed()),
            Err(_) => true,
        }
    }
}

impl std::fmt::Debug for QueueTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueTransport")
            .field("closed", &self.is_closed())
            .finish()
    }
}
