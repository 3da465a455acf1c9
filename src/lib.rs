//! # formlink
//!
//! Encrypted request/response messaging over TCP.
//!
//! Messages are [`Form`]s: typed name/value records with a compact binary
//! encoding. Each form travels as one AES-GCM sealed, length-prefixed frame
//! under a pre-shared key.
//!
//! ## Architecture
//!
//! - **Server**: accepts connections and answers each request with a [`Handler`]
//! - **Client**: one auto-reconnecting connection, many concurrent calls
//!   matched to responses by transaction id
//!
//! ## Example
//!
//! ```ignore
//! use std::time::Duration;
//! use formlink::{Client, Form, RequestContext, Server};
//!
//! #[tokio::main]
//! async fn main() -> formlink::Result<()> {
//!     let server = Server::new(KEY_HEX, 3210, |request: Form, _ctx: RequestContext| async move {
//!         request
//!     })?;
//!     server.start().await;
//!
//!     let client = Client::new(KEY_HEX, "localhost", 3210)?;
//!     client.start().await;
//!
//!     let mut request = Form::new();
//!     request.set_string("p1", "aaaa");
//!     let response = client.call(request, Duration::from_secs(1)).await?;
//!     assert_eq!(response.unwrap().get_string("p1"), "aaaa");
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod transport;
pub mod writer;

mod client;
mod peer;
mod registry;
mod server;

pub use client::{Client, ClientBuilder};
pub use codec::{Form, TypeTag, TRANSACTION_ID_FIELD};
pub use config::{ClientConfig, ServerConfig, SharedKey};
pub use error::{FormlinkError, Result};
pub use handler::{sync_handler, Handler, RequestContext};
pub use peer::ConnectedPeer;
pub use registry::ClientRegistry;
pub use server::{Server, ServerBuilder};
