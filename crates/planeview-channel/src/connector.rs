use planeview_frame::FrameConfig;
use planeview_transport::Endpoint;

use crate::channel::{ChannelConfig, Role};
use crate::connection::{attach, Connection};
use crate::error::Result;

/// Dial a listening driver as the display.
pub async fn connect(endpoint: &Endpoint, config: ChannelConfig) -> Result<Connection> {
    connect_with_config(endpoint, Role::Display, config, FrameConfig::default()).await
}

/// Dial with explicit role and framing limits.
pub async fn connect_with_config(
    endpoint: &Endpoint,
    role: Role,
    config: ChannelConfig,
    frame_config: FrameConfig,
) -> Result<Connection> {
    let stream = planeview_transport::connect(endpoint).await?;
    attach(stream, role, config, frame_config)
}

#[cfg(test)]
mod tests {
    use planeview_frame::Value;
    use planeview_transport::{TransportError, DEFAULT_HOST};

    use super::*;
    use crate::error::ChannelError;
    use crate::listener::ChannelListener;

    #[tokio::test]
    async fn connect_convenience() {
        let listener = ChannelListener::bind(&Endpoint::localhost(0))
            .await
            .expect("listener should bind");
        let endpoint = listener.endpoint().clone();

        let server = tokio::spawn(async move {
            listener
                .accept_with(|channel| {
                    channel.register("echo", |message: Value| async move { Ok(message) })
                })
                .await
                .expect("listener should accept")
        });

        let display = connect(&endpoint, ChannelConfig::default().with_session("S"))
            .await
            .expect("display should connect");
        let driver = server.await.expect("server task should finish");

        let reply = display
            .channel()
            .request("echo", Value::from("hello"))
            .await
            .expect("request should succeed");
        assert_eq!(reply.as_str(), Some("hello"));

        display.close("done");
        driver.join().await;
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let port = planeview_transport::free_port(DEFAULT_HOST).expect("free port should be found");
        let err = connect(&Endpoint::localhost(port), ChannelConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Transport(TransportError::Connect { .. })
        ));
    }
}
