//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForLength`: Need at least 4 bytes
//! - `WaitingForPayload`: Length validated, need N more payload bytes
//!
//! One push can yield several frames, and one frame can span many pushes.
//!
//! # Example
//!
//! ```
//! use formlink::protocol::{build_frame, FrameBuffer, DEFAULT_MAX_FRAME_SIZE};
//!
//! let mut buffer = FrameBuffer::new();
//! let bytes = build_frame(b"payload", DEFAULT_MAX_FRAME_SIZE).unwrap();
//!
//! // Data arrives in chunks from the socket
//! assert!(buffer.push(&bytes[..3]).unwrap().is_empty());
//! let frames = buffer.push(&bytes[3..]).unwrap();
//! assert_eq!(frames.len(), 1);
//! ```

use bytes::BytesMut;

use super::wire_format::{decode_length, validate_length, DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE};
use super::Frame;
use crate::error::Result;

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for a complete length prefix.
    WaitingForLength,
    /// Prefix consumed, waiting for payload bytes.
    WaitingForPayload { remaining: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// After an error the buffer content is meaningless; the caller is expected
/// to drop the connection together with the buffer.
#[derive(Debug)]
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed declared frame length.
    max_frame_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max frame: 1MiB.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new frame buffer with custom max frame size.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForLength,
            max_frame_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// # Errors
    ///
    /// Returns `FrameLength` if a declared length is below 4 or above the
    /// maximum. Frames extracted before the bad prefix are discarded too.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.extend(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    /// Append data without extracting anything.
    ///
    /// Pair with [`next_frame`](Self::next_frame) to handle each frame
    /// before the following prefix is even looked at.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` if the declared length is out of bounds
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.state {
                State::WaitingForLength => {
                    let Some(length) = decode_length(&self.buffer) else {
                        return Ok(None);
                    };
                    validate_length(length, self.max_frame_size)?;

                    let _ = self.buffer.split_to(LENGTH_PREFIX_SIZE);
                    self.state = State::WaitingForPayload {
                        remaining: length as usize - LENGTH_PREFIX_SIZE,
                    };
                }

                State::WaitingForPayload { remaining } => {
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }

                    let payload = self.buffer.split_to(remaining).freeze();
                    self.state = State::WaitingForLength;

                    return Ok(Some(Frame::new(payload)));
                }
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForLength;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForLength => "WaitingForLength",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormlinkError;
    use crate::protocol::build_frame;

    fn make_frame_bytes(payload: &[u8]) -> Vec<u8> {
        build_frame(payload, DEFAULT_MAX_FRAME_SIZE).unwrap().to_vec()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&make_frame_bytes(b"hello")).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();

        let mut combined = Vec::new();
        combined.extend(make_frame_bytes(b"first"));
        combined.extend(make_frame_bytes(b"second"));
        combined.extend(make_frame_bytes(b"third"));

        let frames = buffer.push(&combined).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload(), b"first");
        assert_eq!(frames[1].payload(), b"second");
        assert_eq!(frames[2].payload(), b"third");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_prefix() {
        let mut buffer = FrameBuffer::new();
        let frame_bytes = make_frame_bytes(b"test");

        let frames = buffer.push(&frame_bytes[..2]).unwrap();
        assert!(frames.is_empty());
        assert_eq!(buffer.state_name(), "WaitingForLength");

        let frames = buffer.push(&frame_bytes[2..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_payload() {
        let mut buffer = FrameBuffer::new();
        let payload = b"this is a longer payload that will be fragmented";
        let frame_bytes = make_frame_bytes(payload);

        let partial_len = LENGTH_PREFIX_SIZE + 10;
        let frames = buffer.push(&frame_bytes[..partial_len]).unwrap();
        assert!(frames.is_empty());
        assert_eq!(buffer.state_name(), "WaitingForPayload");

        let frames = buffer.push(&frame_bytes[partial_len..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), payload);
    }

    #[test]
    fn test_empty_payload() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&[4, 0, 0, 0]).unwrap();

        assert_eq!(frames.len(), 1);
        assert!(frames[0].payload.is_empty());
    }

    #[test]
    fn test_frame_at_max_size() {
        let max = 1024 * 1024;
        let mut buffer = FrameBuffer::with_max_frame_size(max);
        let payload = vec![0xAB; max as usize - LENGTH_PREFIX_SIZE];

        let frames = buffer.push(&make_frame_bytes(&payload)).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].payload.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_length_above_max_is_rejected() {
        let mut buffer = FrameBuffer::with_max_frame_size(100);
        let result = buffer.push(&1000u32.to_le_bytes());

        assert!(matches!(
            result,
            Err(FormlinkError::FrameLength { length: 1000, max: 100 })
        ));
    }

    #[test]
    fn test_length_below_prefix_is_rejected() {
        for length in 0u32..4 {
            let mut buffer = FrameBuffer::new();
            let result = buffer.push(&length.to_le_bytes());
            assert!(result.is_err(), "length {} must be rejected", length);
        }
    }

    #[test]
    fn test_bad_prefix_after_good_frame() {
        let mut buffer = FrameBuffer::new();
        let mut data = make_frame_bytes(b"ok");
        data.extend_from_slice(&2u32.to_le_bytes());

        assert!(buffer.push(&data).is_err());
    }

    #[test]
    fn test_next_frame_yields_good_frame_before_bad_prefix() {
        let mut buffer = FrameBuffer::new();
        let mut data = make_frame_bytes(b"ok");
        data.extend_from_slice(&2u32.to_le_bytes());
        buffer.extend(&data);

        let first = buffer.next_frame().unwrap().unwrap();
        assert_eq!(first.payload(), b"ok");
        assert!(buffer.next_frame().is_err());
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = FrameBuffer::new();
        let frame_bytes = make_frame_bytes(b"test");

        buffer.push(&frame_bytes[..6]).unwrap();
        assert_eq!(buffer.state_name(), "WaitingForPayload");
        assert_eq!(buffer.len(), 2);

        buffer.clear();

        assert_eq!(buffer.state_name(), "WaitingForLength");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut buffer = FrameBuffer::new();

        let frame1 = make_frame_bytes(b"first");
        let frame2 = make_frame_bytes(b"second");

        let mut data = frame1.clone();
        data.extend_from_slice(&frame2[..5]);

        let frames = buffer.push(&data).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"first");

        let frames = buffer.push(&frame2[5..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"second");
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let mut stream = make_frame_bytes(b"hi");
        stream.extend(make_frame_bytes(b"there"));

        let mut all_frames = Vec::new();
        for byte in &stream {
            all_frames.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all_frames.len(), 2);
        assert_eq!(all_frames[0].payload(), b"hi");
        assert_eq!(all_frames[1].payload(), b"there");
    }
}
