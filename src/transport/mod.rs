//! Transport module - TCP sockets and the sealed-frame pipeline.
//!
//! Provides:
//! - [`SecureTransport`]: form ⇄ encrypted frame conversion and the read loop
//! - TCP dial/listen helpers

mod secure;
mod tcp;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub use secure::{FormDecoder, SecureTransport, READ_CHUNK_SIZE};
pub use tcp::{connect, Listener};

/// Sleep for `delay` unless `shutdown` fires first.
///
/// Returns `true` if the sleep was cut short by cancellation.
pub(crate) async fn sleep_or_cancelled(shutdown: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
