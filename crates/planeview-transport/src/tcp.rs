use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// TCP listener for display peers.
///
/// The display side of a channel normally runs in a browser and dials the
/// driver, so the driver owns the listening socket.
pub struct TcpAcceptor {
    listener: TcpListener,
    endpoint: Endpoint,
}

impl TcpAcceptor {
    /// Bind and listen on `endpoint`.
    ///
    /// Port `0` binds an ephemeral port; [`TcpAcceptor::endpoint`] reports
    /// the port actually bound.
    pub async fn bind(endpoint: &Endpoint) -> Result<Self> {
        let listener = TcpListener::bind(endpoint.authority())
            .await
            .map_err(|source| TransportError::Bind {
                endpoint: endpoint.clone(),
                source,
            })?;
        let local = listener.local_addr()?;
        let endpoint = Endpoint::new(endpoint.host.clone(), local.port());

        info!(%endpoint, "listening for display peers");

        Ok(Self { listener, endpoint })
    }

    /// Accept an incoming connection.
    pub async fn accept(&self) -> Result<TcpStream> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        debug!(%addr, "accepted connection");
        Ok(stream)
    }

    /// The endpoint this listener is bound to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

/// Connect to a listening endpoint.
pub async fn connect(endpoint: &Endpoint) -> Result<TcpStream> {
    let stream = TcpStream::connect(endpoint.authority())
        .await
        .map_err(|source| TransportError::Connect {
            endpoint: endpoint.clone(),
            source,
        })?;
    stream.set_nodelay(true)?;
    debug!(%endpoint, "connected");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::endpoint::DEFAULT_HOST;

    #[tokio::test]
    async fn bind_accept_connect() {
        let acceptor = TcpAcceptor::bind(&Endpoint::new(DEFAULT_HOST, 0))
            .await
            .unwrap();
        let endpoint = acceptor.endpoint().clone();
        assert_ne!(endpoint.port, 0);

        let client = tokio::spawn(async move {
            let mut stream = connect(&endpoint).await.unwrap();
            stream.write_all(b"hello").await.unwrap();
        });

        let mut server = acceptor.accept().await.unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        client.await.unwrap();
    }

    #[tokio::test]
    async fn connect_refused_reports_endpoint() {
        let port = crate::endpoint::free_port(DEFAULT_HOST).unwrap();
        let endpoint = Endpoint::localhost(port);
        let err = connect(&endpoint).await.unwrap_err();
        match err {
            TransportError::Connect { endpoint: failed, .. } => assert_eq!(failed, endpoint),
            other => panic!("expected connect error, got {other:?}"),
        }
    }
}
