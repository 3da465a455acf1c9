//! TCP connect and listen helpers.
//!
//! # Example
//!
//! ```ignore
//! use formlink::transport::{connect, Listener};
//!
//! let listener = Listener::bind("127.0.0.1:0").await?;
//! let (stream, peer) = listener.accept().await?;
//! ```

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};

use crate::error::Result;

/// Dial `endpoint` (`host:port`) with Nagle disabled.
pub async fn connect(endpoint: &str) -> Result<TcpStream> {
    let stream = TcpStream::connect(endpoint).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Bound TCP listener.
#[derive(Debug)]
pub struct Listener {
    listener: TcpListener,
}

impl Listener {
    /// Bind to `endpoint` (`host:port`; port 0 picks an ephemeral port).
    pub async fn bind(endpoint: &str) -> Result<Self> {
        let listener = TcpListener::bind(endpoint).await?;
        Ok(Self { listener })
    }

    /// Accept a single connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("set_nodelay failed for {}: {}", addr, e);
        }
        Ok((stream, addr))
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_listener_accepts_connection() {
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let connector = tokio::spawn(async move {
            let mut stream = connect(&addr.to_string()).await.unwrap();
            stream.write_all(b"ping").await.unwrap();
        });

        let (mut stream, peer) = listener.accept().await.unwrap();
        assert!(peer.ip().is_loopback());

        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        connector.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(connect(&addr.to_string()).await.is_err());
    }
}
