//! Echo - simple request/response example.
//!
//! This example demonstrates:
//! - Starting a server with an async handler
//! - Connecting a client with a hex key
//! - Sending a form and reading the matching response
//!
//! # Running
//!
//! ```text
//! RUST_LOG=formlink=debug cargo run --example echo
//! ```

use std::time::Duration;

use formlink::{Client, Form, RequestContext, Server};
use tracing_subscriber::EnvFilter;

const KEY_HEX: &str = "6b2f5e1c9a0d4e8f7a3b2c1d0e9f8a7b6c5d4e3f2a1b0c9d8e7f6a5b4c3d2e1f";
const PORT: u16 = 3210;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let server = Server::new(KEY_HEX, PORT, |request: Form, ctx: RequestContext| async move {
        tracing::info!(
            "peer {} sent transaction {}",
            ctx.peer_id(),
            ctx.transaction_id()
        );
        let mut response = Form::new();
        response.set_string("p1", &request.get_string("p1"));
        response
    })?;
    server.start().await;
    server.local_addr().await?;

    let client = Client::new(KEY_HEX, "localhost", PORT)?;
    client.start().await;

    let mut request = Form::new();
    request.set_string("p1", "aaaa");

    match client.call(request, Duration::from_secs(1)).await? {
        Some(response) => println!("p1 = {}", response.get_string("p1")),
        None => println!("no response"),
    }

    client.stop().await;
    server.stop().await;
    Ok(())
}
