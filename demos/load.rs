//! Load - many concurrent clients hammering one server.
//!
//! Every client loops sending a small form and counts the calls that came
//! back. Once a second the total is printed and reset.
//!
//! # Running
//!
//! ```text
//! cargo run --release --example load -- 1000 10
//! ```
//!
//! Arguments: number of clients (default 1000), seconds to run (default 10).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use formlink::{sync_handler, Client, Form, Server};
use tracing_subscriber::EnvFilter;

const KEY_HEX: &str = "6b2f5e1c9a0d4e8f7a3b2c1d0e9f8a7b6c5d4e3f2a1b0c9d8e7f6a5b4c3d2e1f";
const PORT: u16 = 3211;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let clients: usize = args.next().map(|a| a.parse()).transpose()?.unwrap_or(1000);
    let seconds: u64 = args.next().map(|a| a.parse()).transpose()?.unwrap_or(10);

    let server = Server::new(KEY_HEX, PORT, sync_handler(|request: Form| request))?;
    server.start().await;
    server.local_addr().await?;

    let completed = Arc::new(AtomicU64::new(0));
    let mut workers = Vec::with_capacity(clients);
    for _ in 0..clients {
        let client = Client::new(KEY_HEX, "127.0.0.1", PORT)?;
        client.start().await;
        let completed = Arc::clone(&completed);
        workers.push(tokio::spawn(async move {
            loop {
                let mut request = Form::new();
                request.set_string("p1", "aaaa");
                if let Ok(Some(_)) = client.call(request, Duration::from_secs(1)).await {
                    completed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;
    for second in 1..=seconds {
        ticker.tick().await;
        let count = completed.swap(0, Ordering::Relaxed);
        println!("{:>3}s  {} calls/s", second, count);
    }

    for worker in workers {
        worker.abort();
    }
    server.stop().await;
    Ok(())
}
