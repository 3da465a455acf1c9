//! Frame struct and frame building.
//!
//! A [`Frame`] is one length-prefixed unit extracted from the byte stream.
//! Its payload is still sealed; see [`FrameCipher`](super::FrameCipher).
//!
//! # Example
//!
//! ```
//! use formlink::protocol::{build_frame, FrameBuffer, DEFAULT_MAX_FRAME_SIZE};
//!
//! let bytes = build_frame(b"sealed", DEFAULT_MAX_FRAME_SIZE).unwrap();
//! assert_eq!(bytes.len(), 4 + 6);
//!
//! let mut buffer = FrameBuffer::new();
//! let frames = buffer.push(&bytes).unwrap();
//! assert_eq!(frames[0].payload(), b"sealed");
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::{encode_length, LENGTH_PREFIX_SIZE};
use crate::error::Result;

/// A complete frame with its prefix stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from its payload.
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Declared total length, prefix included.
    #[inline]
    pub fn declared_length(&self) -> usize {
        LENGTH_PREFIX_SIZE + self.payload.len()
    }
}

/// Build a complete frame as a single contiguous buffer.
///
/// # Errors
///
/// Returns `FrameLength` if the frame would exceed `max_frame_size`.
pub fn build_frame(payload: &[u8], max_frame_size: u32) -> Result<Bytes> {
    let prefix = encode_length(payload.len(), max_frame_size)?;
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_slice(&prefix);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormlinkError;

    #[test]
    fn test_frame_creation() {
        let frame = Frame::new(Bytes::from_static(b"hello"));
        assert_eq!(frame.payload(), b"hello");
        assert_eq!(frame.declared_length(), 9);
    }

    #[test]
    fn test_build_frame_layout() {
        let bytes = build_frame(b"hello", 1024).unwrap();
        assert_eq!(&bytes[..4], &9u32.to_le_bytes());
        assert_eq!(&bytes[4..], b"hello");
    }

    #[test]
    fn test_build_empty_frame() {
        let bytes = build_frame(&[], 1024).unwrap();
        assert_eq!(&bytes[..], &[4, 0, 0, 0]);
    }

    #[test]
    fn test_build_frame_too_large() {
        let payload = vec![0u8; 100];
        let err = build_frame(&payload, 64).unwrap_err();
        assert!(matches!(err, FormlinkError::FrameLength { length: 104, max: 64 }));
    }
}
