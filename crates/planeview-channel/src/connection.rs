use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use planeview_frame::{FrameCodec, FrameConfig};
use planeview_transport::QueueTransport;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

use crate::channel::{ChannelConfig, CorrelatedChannel, Role};
use crate::error::Result;

/// A channel bound to a live byte stream.
///
/// Owns the reader task feeding inbound frames to the channel and the writer
/// task draining its outbound queue. Either side failing closes the channel.
#[derive(Debug)]
pub struct Connection {
    channel: CorrelatedChannel,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    pub fn channel(&self) -> &CorrelatedChannel {
        &self.channel
    }

    /// Close the channel; queued outbound frames are still flushed.
    pub fn close(&self, reason: impl Into<String>) {
        self.channel.close(reason);
    }

    /// Wait until both the reader and writer tasks have finished.
    pub async fn join(self) {
        for (task, name) in [(self.reader, "reader"), (self.writer, "writer")] {
            if let Err(err) = task.await {
                warn!(task = name, error = %err, "connection task failed");
            }
        }
    }
}

/// Run a channel over `stream`.
///
/// Must be called within a Tokio runtime.
pub fn attach<S>(
    stream: S,
    role: Role,
    config: ChannelConfig,
    frame_config: FrameConfig,
) -> Result<Connection>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    attach_with(stream, role, config, frame_config, |_| {})
}

/// Like [`attach`], but runs `setup` (typically handler registration)
/// before the first inbound frame is read.
pub fn attach_with<S, F>(
    stream: S,
    role: Role,
    config: ChannelConfig,
    frame_config: FrameConfig,
    setup: F,
) -> Result<Connection>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    F: FnOnce(&CorrelatedChannel),
{
    let (read_half, write_half) = tokio::io::split(stream);
    let (transport, outbound) = QueueTransport::new();
    let channel = CorrelatedChannel::with_config(role, Arc::new(transport), config)?;
    setup(&channel);

    let framed_write = FramedWrite::new(write_half, FrameCodec::with_config(frame_config.clone()));
    let framed_read = FramedRead::new(read_half, FrameCodec::with_config(frame_config));

    let writer = tokio::spawn(write_loop(framed_write, outbound, channel.clone()));
    let reader = tokio::spawn(read_loop(framed_read, channel.clone()));

    Ok(Connection {
        channel,
        reader,
        writer,
    })
}

async fn read_loop<S>(mut frames: FramedRead<ReadHalf<S>, FrameCodec>, channel: CorrelatedChannel)
where
    S: AsyncRead + AsyncWrite,
{
    let cancel = channel.cancellation_token();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = frames.next() => match next {
                Some(Ok(payload)) => {
                    if let Err(err) = channel.on_frame(&payload) {
                        debug!(error = %err, "reader stopping");
                        break;
                    }
                }
                Some(Err(err)) => {
                    channel.close(format!("read failed: {err}"));
                    break;
                }
                None => {
                    channel.close("peer disconnected");
                    break;
                }
            },
        }
    }
}

async fn write_loop<S>(
    mut sink: FramedWrite<WriteHalf<S>, FrameCodec>,
    mut outbound: UnboundedReceiver<Bytes>,
    channel: CorrelatedChannel,
) where
    S: AsyncRead + AsyncWrite,
{
    while let Some(frame) = outbound.recv().await {
        if let Err(err) = sink.send(frame).await {
            channel.close(format!("write failed: {err}"));
            return;
        }
    }
    if let Err(err) = sink.close().await {
        debug!(error = %err, "shutdown of write half failed");
    }
}
