//! Wire format for frame length prefixes.
//!
//! Every frame starts with a 4-byte length that counts itself:
//! ```text
//! ┌──────────────┬──────────────────────────────┐
//! │ Total length │ Sealed payload               │
//! │ u32 LE       │ (total length - 4) bytes     │
//! └──────────────┴──────────────────────────────┘
//! ```
//!
//! A declared length below 4 or above the configured maximum is a protocol
//! violation and terminates the connection.

use crate::error::{FormlinkError, Result};

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Smallest legal declared frame length (an empty payload).
pub const MIN_FRAME_SIZE: u32 = LENGTH_PREFIX_SIZE as u32;

/// Default maximum declared frame length (1 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Encode the total length of a frame carrying `payload_len` bytes.
///
/// # Errors
///
/// Returns `FrameLength` if the total does not fit in `max_frame_size`.
///
/// # Example
///
/// ```
/// use formlink::protocol::{encode_length, DEFAULT_MAX_FRAME_SIZE};
///
/// let prefix = encode_length(5, DEFAULT_MAX_FRAME_SIZE).unwrap();
/// assert_eq!(prefix, [9, 0, 0, 0]);
/// ```
pub fn encode_length(payload_len: usize, max_frame_size: u32) -> Result<[u8; LENGTH_PREFIX_SIZE]> {
    let total = payload_len
        .checked_add(LENGTH_PREFIX_SIZE)
        .and_then(|t| u32::try_from(t).ok())
        .unwrap_or(u32::MAX);
    validate_length(total, max_frame_size)?;
    Ok(total.to_le_bytes())
}

/// Decode a length prefix.
///
/// Returns `None` if the buffer is too short.
#[inline]
pub fn decode_length(buf: &[u8]) -> Option<u32> {
    let raw = buf.get(..LENGTH_PREFIX_SIZE)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Check a declared frame length against `MIN_FRAME_SIZE..=max_frame_size`.
pub fn validate_length(length: u32, max_frame_size: u32) -> Result<()> {
    if length < MIN_FRAME_SIZE || length > max_frame_size {
        return Err(FormlinkError::FrameLength {
            length,
            max: max_frame_size,
        });
    }
    Ok(())
}
