//! Client builder and connection loop.
//!
//! A [`Client`] keeps one TCP connection to its server alive in the
//! background and multiplexes request/response calls over it:
//! 1. Connect (retrying every `connect_backoff` while the server is away)
//! 2. Read frames, matching each response to its pending call by transaction id
//! 3. On any read, framing or crypto error, drop the connection and reconnect
//!
//! Calls made while disconnected wait for the next connection.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use formlink::{Client, Form};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(KEY_HEX, "localhost", 3210)?;
//!     client.start().await;
//!
//!     let mut request = Form::new();
//!     request.set_string("p1", "aaaa");
//!     let response = client.call(request, Duration::from_secs(1)).await?;
//!
//!     client.stop().await;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::Form;
use crate::config::{ClientConfig, SharedKey};
use crate::error::{FormlinkError, Result};
use crate::transport::{connect, sleep_or_cancelled, SecureTransport};
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Builder for configuring a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn new(key: SharedKey, address: impl Into<String>, port: u16) -> Self {
        Self {
            config: ClientConfig::new(key, address, port),
        }
    }

    /// Wait after a failed connection attempt (default 1s).
    pub fn connect_backoff(mut self, backoff: Duration) -> Self {
        self.config.connect_backoff = backoff;
        self
    }

    /// Wait before reconnecting after a connection is lost (default 10ms).
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Largest frame accepted from or sent to the server.
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Writer channel capacity.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn build(self) -> Client {
        Client::with_config(self.config)
    }
}

/// A call waiting for its response.
#[derive(Debug)]
struct PendingRequest {
    /// The request as sent, transaction id included.
    outbound: Form,
    reply: oneshot::Sender<Form>,
}

#[derive(Debug, Default)]
struct ClientState {
    /// Writer of the live connection, if any.
    writer: Option<WriterHandle>,
    next_transaction: u64,
    pending: HashMap<String, PendingRequest>,
}

struct ClientInner {
    config: ClientConfig,
    transport: SecureTransport,
    state: Mutex<ClientState>,
    connected: watch::Sender<bool>,
}

/// Multiplexing request/response client with automatic reconnection.
///
/// Calls may be issued concurrently from any number of tasks; responses
/// are matched by transaction id in whatever order they arrive.
///
/// Stopping is terminal. Dropping the client stops its connection task.
pub struct Client {
    inner: Arc<ClientInner>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Create a client for `address:port`.
    ///
    /// # Errors
    ///
    /// `InvalidKey` if `key_hex` is not valid hex.
    pub fn new(key_hex: &str, address: impl Into<String>, port: u16) -> Result<Self> {
        Ok(Self::builder(SharedKey::from_hex(key_hex)?, address, port).build())
    }

    pub fn builder(key: SharedKey, address: impl Into<String>, port: u16) -> ClientBuilder {
        ClientBuilder::new(key, address, port)
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let transport = SecureTransport::new(config.key.cipher(), config.max_frame_size);
        let (connected, _) = watch::channel(false);
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                state: Mutex::new(ClientState::default()),
                connected,
            }),
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// `address:port` of the server.
    pub fn endpoint(&self) -> String {
        self.inner.config.endpoint()
    }

    /// Launch the connection loop in the background. Idempotent.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() || self.shutdown.is_cancelled() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(connection_loop(inner, self.shutdown.clone())));
    }

    /// Whether a connection is currently established.
    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    /// Number of calls still waiting for a response.
    pub async fn pending_count(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }

    /// Send `form` and wait up to `timeout` for the matching response.
    ///
    /// A fresh transaction id is stamped into the form first. With a zero
    /// timeout the form is sent fire-and-forget and `Ok(None)` is returned
    /// once it has been written.
    ///
    /// Waiting for a connection and waiting for the response each get their
    /// own `timeout` window, so a call can take up to twice `timeout`.
    ///
    /// # Errors
    ///
    /// - `NoConnection` if no connection became available in time
    /// - `Timeout` if no response arrived in time (a late response is dropped)
    /// - `Write` if the connection failed while sending
    /// - `ConnectionClosed` if the client was stopped while waiting
    /// - `FrameLength` if the sealed form does not fit in one frame
    pub async fn call(&self, mut form: Form, timeout: Duration) -> Result<Option<Form>> {
        let transaction_id = self.inner.next_transaction_id().await;
        form.set_transaction_id(&transaction_id);

        self.wait_for_connection(timeout).await?;
        let frame = self.inner.transport.seal_form(&form)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let writer = {
            let mut state = self.inner.state.lock().await;
            let writer = state.writer.clone().ok_or(FormlinkError::NoConnection)?;
            state.pending.insert(
                transaction_id.clone(),
                PendingRequest {
                    outbound: form,
                    reply: reply_tx,
                },
            );
            writer
        };

        if let Err(e) = writer.write(frame).await {
            self.inner.forget(&transaction_id).await;
            return Err(e);
        }

        if timeout.is_zero() {
            self.inner.forget(&transaction_id).await;
            return Ok(None);
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(response)) => Ok(Some(response)),
            Ok(Err(_)) => Err(FormlinkError::ConnectionClosed),
            Err(_) => {
                if let Some(pending) = self.inner.forget(&transaction_id).await {
                    tracing::debug!(
                        "Transaction {} timed out ({} fields sent)",
                        transaction_id,
                        pending.outbound.len()
                    );
                }
                Err(FormlinkError::Timeout)
            }
        }
    }

    async fn wait_for_connection(&self, timeout: Duration) -> Result<()> {
        let mut connected = self.inner.connected.subscribe();
        if *connected.borrow_and_update() {
            return Ok(());
        }
        if timeout.is_zero() {
            return Err(FormlinkError::NoConnection);
        }

        let waited = tokio::time::timeout(timeout, connected.wait_for(|up| *up)).await;
        match waited {
            Ok(Ok(_)) => Ok(()),
            _ => Err(FormlinkError::NoConnection),
        }
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Calls still waiting for a response fail with `ConnectionClosed`.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("Connection task failed: {}", e);
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.inner.config.endpoint())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl ClientInner {
    async fn next_transaction_id(&self) -> String {
        let mut state = self.state.lock().await;
        let id = state.next_transaction;
        state.next_transaction += 1;
        id.to_string()
    }

    async fn forget(&self, transaction_id: &str) -> Option<PendingRequest> {
        self.state.lock().await.pending.remove(transaction_id)
    }

    async fn set_writer(&self, writer: Option<WriterHandle>) {
        let up = writer.is_some();
        self.state.lock().await.writer = writer;
        self.connected.send_replace(up);
    }

    /// Hand a response to the call waiting on its transaction id.
    async fn complete(&self, response: Form) {
        let transaction_id = response.transaction_id();
        match self.forget(&transaction_id).await {
            Some(pending) => {
                if pending.reply.send(response).is_err() {
                    tracing::debug!("Caller of transaction {} went away", transaction_id);
                }
            }
            None => tracing::debug!("Dropping unmatched response {:?}", transaction_id),
        }
    }
}

/// Run one established connection until the read side ends or the writer
/// task stops. Either way the writer is detached before returning.
async fn serve_connection<R, W>(
    inner: &Arc<ClientInner>,
    reader: R,
    writer: W,
    shutdown: &CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (handle, mut writer_task) = spawn_writer_task(
        writer,
        WriterConfig::with_capacity(inner.config.channel_capacity),
    );
    inner.set_writer(Some(handle)).await;

    let read = inner.transport.read_forms(reader, shutdown, |response| {
        let inner = Arc::clone(inner);
        tokio::spawn(async move { inner.complete(response).await });
        std::future::ready(Ok(()))
    });
    let result = tokio::select! {
        result = read => result,
        written = &mut writer_task => match written {
            Ok(Ok(())) => Err(FormlinkError::ConnectionClosed),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(FormlinkError::Write(e.to_string())),
        },
    };

    inner.set_writer(None).await;
    writer_task.abort();
    result
}

async fn connection_loop(inner: Arc<ClientInner>, shutdown: CancellationToken) {
    let endpoint = inner.config.endpoint();

    loop {
        let connected = tokio::select! {
            _ = shutdown.cancelled() => break,
            connected = connect(&endpoint) => connected,
        };
        let stream = match connected {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Connect to {} failed: {}", endpoint, e);
                if sleep_or_cancelled(&shutdown, inner.config.connect_backoff).await {
                    break;
                }
                continue;
            }
        };
        tracing::info!("Connected to {}", endpoint);

        let (read_half, write_half) = stream.into_split();
        let result = serve_connection(&inner, read_half, write_half, &shutdown).await;

        match result {
            Ok(()) if shutdown.is_cancelled() => break,
            Ok(()) => tracing::info!("Connection to {} closed by server", endpoint),
            Err(e) => tracing::warn!("Connection to {} lost: {}", endpoint, e),
        }

        if sleep_or_cancelled(&shutdown, inner.config.reconnect_delay).await {
            break;
        }
    }

    inner.set_writer(None).await;
    let abandoned = std::mem::take(&mut inner.state.lock().await.pending);
    if !abandoned.is_empty() {
        tracing::debug!("Abandoning {} pending calls", abandoned.len());
    }
    tracing::info!("Client for {} stopped", endpoint);
}
