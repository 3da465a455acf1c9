//! One accepted connection on the server side.
//!
//! Requests on a connection are handled strictly one after another: the
//! next frame is not decoded until the response to the current one has been
//! written. Concurrency comes from many connections, not from one.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::Form;
use crate::error::Result;
use crate::handler::{Handler, RequestContext};
use crate::transport::SecureTransport;
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Server-side record of an accepted connection.
#[derive(Debug)]
pub struct ConnectedPeer {
    id: u64,
    remote_addr: SocketAddr,
    active: Arc<AtomicBool>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ConnectedPeer {
    /// Start serving `stream` on its own task.
    pub(crate) fn spawn(
        id: u64,
        stream: TcpStream,
        remote_addr: SocketAddr,
        transport: SecureTransport,
        handler: Arc<dyn Handler>,
        writer_config: WriterConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let session = PeerSession {
            id,
            remote_addr,
            transport,
            handler,
        };

        let task = tokio::spawn(session.run(
            stream,
            writer_config,
            Arc::clone(&active),
            shutdown.clone(),
        ));

        Self {
            id,
            remote_addr,
            active,
            shutdown,
            task,
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Whether the connection has ended and the peer can be discarded.
    pub fn is_disconnected(&self) -> bool {
        !self.active.load(Ordering::Acquire) || self.task.is_finished()
    }

    /// Close the connection and wait for its task to finish.
    pub(crate) async fn close(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("Peer {} task failed: {}", self.id, e);
        }
    }
}

/// Clears the active flag when the session ends, including by panic.
struct ActiveFlag(Arc<AtomicBool>);

impl Drop for ActiveFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// State moved into the per-connection task.
struct PeerSession {
    id: u64,
    remote_addr: SocketAddr,
    transport: SecureTransport,
    handler: Arc<dyn Handler>,
}

impl PeerSession {
    async fn run(
        self,
        stream: TcpStream,
        writer_config: WriterConfig,
        active: Arc<AtomicBool>,
        shutdown: CancellationToken,
    ) {
        let _active = ActiveFlag(active);
        let (read_half, write_half) = stream.into_split();
        let (writer, writer_task) = spawn_writer_task(write_half, writer_config);

        let serve = self
            .transport
            .read_forms(read_half, &shutdown, |request| self.respond(&writer, request));
        // A handler still running at shutdown is abandoned.
        let result = tokio::select! {
            _ = shutdown.cancelled() => Ok(()),
            result = serve => result,
        };

        match result {
            Ok(()) => tracing::info!("Peer {} ({}) disconnected", self.id, self.remote_addr),
            Err(e) if e.is_fatal_to_connection() => {
                tracing::warn!("Peer {} ({}) dropped: {}", self.id, self.remote_addr, e)
            }
            Err(e) => tracing::info!("Peer {} ({}) closed: {}", self.id, self.remote_addr, e),
        }

        drop(writer);
        writer_task.abort();
    }

    /// Run the handler and write its response back, echoing the request's
    /// transaction id.
    async fn respond(&self, writer: &WriterHandle, request: Form) -> Result<()> {
        let transaction_id = request.transaction_id();
        let ctx = RequestContext::new(self.id, Some(self.remote_addr), transaction_id.clone());

        let mut response = self.handler.call(request, ctx).await;
        response.set_transaction_id(&transaction_id);

        let frame = match self.transport.seal_form(&response) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(
                    "Peer {}: dropping response to transaction {}: {}",
                    self.id,
                    transaction_id,
                    e
                );
                return Ok(());
            }
        };

        writer.write(frame).await
    }
}
