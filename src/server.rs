//! Encrypted form server.
//!
//! The server binds a TCP port, accepts connections forever and answers each
//! request form with whatever its [`Handler`] returns. If binding fails it
//! retries every `bind_backoff`; if the listener breaks it rebinds.
//!
//! # Example
//!
//! ```ignore
//! use formlink::{Form, RequestContext, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(KEY_HEX, 3210, |request: Form, _ctx: RequestContext| async move {
//!         request
//!     })?;
//!     server.start().await;
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ServerConfig, SharedKey};
use crate::error::{FormlinkError, Result};
use crate::handler::Handler;
use crate::peer::ConnectedPeer;
use crate::transport::{sleep_or_cancelled, Listener, SecureTransport};
use crate::writer::WriterConfig;

/// Builder for configuring a [`Server`].
#[derive(Debug, Clone)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    pub fn new(key: SharedKey, port: u16) -> Self {
        Self {
            config: ServerConfig::new(key, port),
        }
    }

    /// Interface to bind (default `0.0.0.0`).
    pub fn bind_address(mut self, address: impl Into<String>) -> Self {
        self.config.bind_address = address.into();
        self
    }

    /// Wait between failed bind attempts (default 5s).
    pub fn bind_backoff(mut self, backoff: Duration) -> Self {
        self.config.bind_backoff = backoff;
        self
    }

    /// Largest frame accepted from or sent to peers.
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Per-connection writer channel capacity.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn build(self, handler: impl Handler) -> Server {
        Server::with_config(self.config, handler)
    }
}

/// Peers keyed by id, plus the next id to hand out.
#[derive(Debug, Default)]
struct PeerTable {
    next_id: u64,
    peers: HashMap<u64, ConnectedPeer>,
}

struct ServerInner {
    config: ServerConfig,
    transport: SecureTransport,
    handler: Arc<dyn Handler>,
    peers: Mutex<PeerTable>,
    bound: watch::Sender<Option<SocketAddr>>,
}

/// Accepts connections and serves request forms with a handler.
///
/// Stopping is terminal: a stopped server cannot be started again.
/// Dropping the server stops its background tasks.
pub struct Server {
    inner: Arc<ServerInner>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    /// Create a server for `port` on all interfaces.
    ///
    /// # Errors
    ///
    /// `InvalidKey` if `key_hex` is not valid hex.
    pub fn new(key_hex: &str, port: u16, handler: impl Handler) -> Result<Self> {
        Ok(Self::builder(SharedKey::from_hex(key_hex)?, port).build(handler))
    }

    pub fn builder(key: SharedKey, port: u16) -> ServerBuilder {
        ServerBuilder::new(key, port)
    }

    pub fn with_config(config: ServerConfig, handler: impl Handler) -> Self {
        let transport = SecureTransport::new(config.key.cipher(), config.max_frame_size);
        let (bound, _) = watch::channel(None);
        Self {
            inner: Arc::new(ServerInner {
                config,
                transport,
                handler: Arc::new(handler),
                peers: Mutex::new(PeerTable::default()),
                bound,
            }),
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Launch the accept loop in the background. Idempotent.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() || self.shutdown.is_cancelled() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(accept_loop(inner, self.shutdown.clone())));
    }

    /// Wait until the listener is bound and return its address.
    ///
    /// Useful with port 0. Fails with `ConnectionClosed` if the server is
    /// stopped first.
    pub async fn local_addr(&self) -> Result<SocketAddr> {
        let mut bound = self.inner.bound.subscribe();
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(FormlinkError::ConnectionClosed),
            addr = bound.wait_for(Option::is_some) => match addr {
                Ok(addr) => (*addr).ok_or(FormlinkError::ConnectionClosed),
                Err(_) => Err(FormlinkError::ConnectionClosed),
            },
        }
    }

    /// Ids of connections that are still open, ascending.
    pub async fn connected_peers(&self) -> Vec<u64> {
        let table = self.inner.peers.lock().await;
        let mut ids: Vec<u64> = table
            .peers
            .values()
            .filter(|peer| !peer.is_disconnected())
            .map(ConnectedPeer::id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Stop accepting, close every connection and wait for the tasks.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("Accept loop task failed: {}", e);
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("bind", &self.inner.config.bind_endpoint())
            .field("stopped", &self.shutdown.is_cancelled())
            .finish()
    }
}

async fn accept_loop(inner: Arc<ServerInner>, shutdown: CancellationToken) {
    let endpoint = inner.config.bind_endpoint();

    'serve: loop {
        let bound = tokio::select! {
            _ = shutdown.cancelled() => break 'serve,
            bound = Listener::bind(&endpoint) => bound,
        };
        let listener = match bound {
            Ok(listener) => listener,
            Err(e) => {
                tracing::warn!("Bind to {} failed: {}", endpoint, e);
                if sleep_or_cancelled(&shutdown, inner.config.bind_backoff).await {
                    break 'serve;
                }
                continue;
            }
        };

        let local = listener.local_addr().ok();
        tracing::info!("Listening on {:?}", local);
        inner.bound.send_replace(local);

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break 'serve,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, remote_addr)) => inner.register(stream, remote_addr, &shutdown).await,
                Err(e) => {
                    tracing::warn!("Accept on {} failed, rebinding: {}", endpoint, e);
                    break;
                }
            }
        }

        inner.bound.send_replace(None);
    }

    inner.bound.send_replace(None);
    let peers: Vec<ConnectedPeer> = {
        let mut table = inner.peers.lock().await;
        table.peers.drain().map(|(_, peer)| peer).collect()
    };
    for peer in peers {
        peer.close().await;
    }
    tracing::info!("Server on {} stopped", endpoint);
}

impl ServerInner {
    /// Discard finished peers, then start serving a new connection under the
    /// next id.
    async fn register(&self, stream: TcpStream, remote_addr: SocketAddr, shutdown: &CancellationToken) {
        let mut table = self.peers.lock().await;
        table.peers.retain(|_, peer| !peer.is_disconnected());

        let id = table.next_id;
        table.next_id += 1;

        let peer = ConnectedPeer::spawn(
            id,
            stream,
            remote_addr,
            self.transport.clone(),
            Arc::clone(&self.handler),
            WriterConfig::with_capacity(self.config.channel_capacity),
            shutdown.child_token(),
        );
        tracing::info!("Accepted peer {} from {}", id, remote_addr);
        table.peers.insert(id, peer);
    }
}
