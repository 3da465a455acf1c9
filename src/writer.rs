//! Dedicated writer task for one connection.
//!
//! Every frame sent on a connection goes through a single task that owns the
//! write half, fed by an mpsc channel. Frames are therefore written whole and
//! one after another, never interleaved, no matter how many callers send
//! concurrently.
//!
//! # Architecture
//!
//! ```text
//! call 1 ─┐
//! call 2 ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Socket
//! call N ─┘
//! ```
//!
//! Ready frames are batched into one vectored write. A caller that needs the
//! outcome of its write uses [`WriterHandle::write`], which waits for the
//! batch containing its frame to be flushed.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::DEFAULT_CHANNEL_CAPACITY;
use crate::error::{FormlinkError, Result};

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A complete frame (prefix included) ready to be written.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Encoded frame bytes.
    pub bytes: Bytes,
    /// Notified once the frame is flushed or the write fails.
    done: Option<oneshot::Sender<Result<()>>>,
}

impl OutboundFrame {
    /// Create a frame nobody waits on.
    #[inline]
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes, done: None }
    }

    /// Create a frame plus a receiver for its write outcome.
    pub fn with_completion(bytes: Bytes) -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                bytes,
                done: Some(tx),
            },
            rx,
        )
    }

    /// Total size of this frame.
    #[inline]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    fn complete(self, outcome: Result<()>) {
        if let Some(done) = self.done {
            let _ = done.send(outcome);
        }
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for frame queue.
    pub channel_capacity: usize,
}

impl WriterConfig {
    pub fn with_capacity(channel_capacity: usize) -> Self {
        Self {
            channel_capacity: channel_capacity.max(1),
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable and can be shared across concurrent callers.
#[derive(Clone, Debug)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Queue a frame without waiting for it to be written.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| FormlinkError::ConnectionClosed)
    }

    /// Queue a frame and wait until it has been written and flushed.
    ///
    /// # Errors
    ///
    /// Returns `Write` if the socket write failed, `ConnectionClosed` if the
    /// writer task is gone.
    pub async fn write(&self, bytes: Bytes) -> Result<()> {
        let (frame, done) = OutboundFrame::with_completion(bytes);
        self.send(frame).await?;
        done.await.map_err(|_| FormlinkError::ConnectionClosed)?
    }

    /// Check if the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task ends when every handle is dropped (clean shutdown, the write
/// half is dropped with it) or when a write fails.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Main writer loop - receives frames and writes them in batches.
async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundFrame>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(f) => f,
            None => return Ok(()),
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        match write_batch(&mut writer, &batch).await {
            Ok(()) => {
                for frame in batch {
                    frame.complete(Ok(()));
                }
            }
            Err(e) => {
                tracing::warn!("Writer failed after {} queued frames: {}", batch.len(), e);
                let message = e.to_string();
                for frame in batch {
                    frame.complete(Err(FormlinkError::Write(message.clone())));
                }
                return Err(FormlinkError::Write(message));
            }
        }
    }
}

/// Write a batch of frames using scatter/gather I/O, retrying partial
/// writes until every byte is out.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(FormlinkError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data left after `skip_bytes` were written.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for frame in batch {
        let end = offset + frame.size();
        if skip_bytes < end && !frame.bytes.is_empty() {
            let start_in_frame = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&frame.bytes[start_in_frame..]));
        }
        offset = end;
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};

    #[test]
    fn test_outbound_frame_size() {
        let frame = OutboundFrame::new(Bytes::from_static(b"hello"));
        assert_eq!(frame.size(), 5);
    }

    #[test]
    fn test_writer_config_minimum_capacity() {
        assert_eq!(WriterConfig::with_capacity(0).channel_capacity, 1);
        assert_eq!(WriterConfig::default().channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[tokio::test]
    async fn test_write_waits_for_flush() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task(client, WriterConfig::default());

        handle.write(Bytes::from_static(b"hello")).await.unwrap();

        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn test_concurrent_writes_never_interleave() {
        let (client, mut server) = duplex(64 * 1024);
        let (handle, _task) = spawn_writer_task(client, WriterConfig::default());

        let mut tasks = Vec::new();
        for i in 0..20u8 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle.write(Bytes::from(vec![i; 100])).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut buf = vec![0u8; 20 * 100];
        server.read_exact(&mut buf).await.unwrap();
        for chunk in buf.chunks(100) {
            assert!(chunk.iter().all(|b| *b == chunk[0]));
        }
    }

    #[tokio::test]
    async fn test_write_error_reported_to_caller() {
        let (client, server) = duplex(16);
        drop(server);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default());

        let result = handle.write(Bytes::from_static(b"lost")).await;
        assert!(matches!(result, Err(FormlinkError::Write(_))));
        assert!(task.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_send_after_writer_gone() {
        let (client, server) = duplex(16);
        drop(server);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default());
        let _ = handle.write(Bytes::from_static(b"x")).await;
        let _ = task.await;

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(handle.is_closed());
        let result = handle.send(OutboundFrame::new(Bytes::from_static(b"y"))).await;
        assert!(matches!(result, Err(FormlinkError::ConnectionClosed)));
    }

    #[test]
    fn test_build_remaining_slices() {
        let batch = vec![
            OutboundFrame::new(Bytes::from_static(b"abcd")),
            OutboundFrame::new(Bytes::from_static(b"efgh")),
        ];

        assert_eq!(build_remaining_slices(&batch, 0).len(), 2);

        let slices = build_remaining_slices(&batch, 2);
        assert_eq!(slices.len(), 2);
        assert_eq!(&*slices[0], b"cd");

        let slices = build_remaining_slices(&batch, 5);
        assert_eq!(slices.len(), 1);
        assert_eq!(&*slices[0], b"fgh");
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());
        let batch: Vec<_> = (0..5)
            .map(|_| OutboundFrame::new(Bytes::from_static(b"abc")))
            .collect();

        write_batch(&mut buf, &batch).await.unwrap();
        assert_eq!(buf.into_inner(), b"abcabcabcabcabc".to_vec());
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_channel_close() {
        let (client, _server) = duplex(4096);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default());

        drop(handle);

        let result = task.await.unwrap();
        assert!(result.is_ok());
    }
}
