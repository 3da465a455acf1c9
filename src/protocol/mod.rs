//! Protocol module - wire format, framing, and payload sealing.
//!
//! This module implements the layers below the form codec:
//! - 4-byte little-endian length prefix (self-inclusive)
//! - Frame buffer for accumulating partial reads
//! - AES-GCM sealing of frame payloads

mod cipher;
mod frame;
mod frame_buffer;
mod wire_format;

pub use cipher::{FrameCipher, NONCE_SIZE, SEAL_OVERHEAD, TAG_SIZE};
pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    decode_length, encode_length, validate_length, DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE,
    MIN_FRAME_SIZE,
};
