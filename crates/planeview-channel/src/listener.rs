use std::sync::atomic::{AtomicU64, Ordering};

use planeview_frame::FrameConfig;
use planeview_transport::{Endpoint, TcpAcceptor};
use tracing::info;

use crate::channel::{ChannelConfig, CorrelatedChannel, Role};
use crate::connection::{attach_with, Connection};
use crate::error::Result;

/// Accepts display connections and attaches a channel to each.
pub struct ChannelListener {
    acceptor: TcpAcceptor,
    role: Role,
    config: ChannelConfig,
    frame_config: FrameConfig,
    accepted: AtomicU64,
}

impl ChannelListener {
    /// Bind on `endpoint`. Accepted channels play the driver role.
    pub async fn bind(endpoint: &Endpoint) -> Result<Self> {
        let acceptor = TcpAcceptor::bind(endpoint).await?;
        Ok(Self {
            acceptor,
            role: Role::Driver,
            config: ChannelConfig::default(),
            frame_config: FrameConfig::default(),
            accepted: AtomicU64::new(0),
        })
    }

    /// Override channel behavior for accepted connections.
    pub fn with_config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Override framing limits.
    pub fn with_frame_config(mut self, frame_config: FrameConfig) -> Self {
        self.frame_config = frame_config;
        self
    }

    /// Accept the next connection.
    pub async fn accept(&self) -> Result<Connection> {
        self.accept_with(|_| {}).await
    }

    /// Accept the next connection, running `setup` on its channel before
    /// any inbound frame is dispatched.
    pub async fn accept_with<F>(&self, setup: F) -> Result<Connection>
    where
        F: FnOnce(&CorrelatedChannel),
    {
        let stream = self.acceptor.accept().await?;
        let count = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            connection = count,
            transport = self.acceptor.transport_name(),
            role = ?self.role,
            "display connected"
        );
        attach_with(
            stream,
            self.role,
            self.config.clone(),
            self.frame_config.clone(),
            setup,
        )
    }

    /// Bound endpoint, with the actual port when `0` was requested.
    pub fn endpoint(&self) -> &Endpoint {
        self.acceptor.endpoint()
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use planeview_frame::Value;

    use super::*;
    use crate::connector::connect;
    use crate::error::ChannelError;

    #[tokio::test]
    async fn accepts_multiple_sequential_connections() {
        let listener = ChannelListener::bind(&Endpoint::localhost(0))
            .await
            .expect("listener should bind");
        assert_ne!(listener.endpoint().port, 0);
        let endpoint = listener.endpoint().clone();

        let c1 = connect(&endpoint, ChannelConfig::default()).await.expect("first client should connect");
        let first = listener.accept().await.expect("first accept should succeed");
        let c2 = connect(&endpoint, ChannelConfig::default()).await.expect("second client should connect");
        let second = listener.accept().await.expect("second accept should succeed");

        assert_eq!(listener.accepted(), 2);
        assert_eq!(first.channel().role(), Role::Driver);
        assert_eq!(second.channel().role(), Role::Driver);
        assert_eq!(c1.channel().role(), Role::Display);
        drop(c2);
    }

    #[tokio::test]
    async fn listener_config_applies_to_accepted_channels() {
        let listener = ChannelListener::bind(&Endpoint::localhost(0))
            .await
            .expect("listener should bind")
            .with_config(ChannelConfig::default().with_session("shared"));
        let endpoint = listener.endpoint().clone();

        let display = connect(&endpoint, ChannelConfig::default().with_session("wrong"))
            .await
            .expect("display should connect");
        let driver = listener
            .accept_with(|channel| channel.register("ping", |_| async { Ok(Value::Null) }))
            .await
            .expect("accept should succeed");

        let err = display
            .channel()
            .request("ping", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Closed(_)));
        assert!(driver.channel().is_closed());
    }
}
