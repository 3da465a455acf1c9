//! Request context for handlers.
//!
//! Describes where a request came from. The response itself is whatever
//! form the handler returns; the server stamps the transaction id into it
//! and writes it back on the same connection.
//!
//! # Example
//!
//! ```ignore
//! let server = Server::new(KEY, 3210, |request: Form, ctx: RequestContext| async move {
//!     tracing::debug!("request {} from peer {}", ctx.transaction_id(), ctx.peer_id());
//!     request
//! })?;
//! ```

use std::net::SocketAddr;

/// Context passed to request handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Server-assigned connection id.
    peer_id: u64,
    /// Remote socket address, if known.
    remote_addr: Option<SocketAddr>,
    /// Correlation id of the request (empty if the request carried none).
    transaction_id: String,
}

impl RequestContext {
    pub fn new(peer_id: u64, remote_addr: Option<SocketAddr>, transaction_id: String) -> Self {
        Self {
            peer_id,
            remote_addr,
            transaction_id,
        }
    }

    /// Id of the connection the request arrived on.
    ///
    /// Ids are assigned in accept order, starting at 0, and never reused.
    #[inline]
    pub fn peer_id(&self) -> u64 {
        self.peer_id
    }

    #[inline]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    #[inline]
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }
}
