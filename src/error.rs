//! Error types for formlink.

use thiserror::Error;

/// Main error type for all formlink operations.
#[derive(Debug, Error)]
pub enum FormlinkError {
    /// I/O error while connecting, accepting or reading a socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Writing a frame to the connection failed.
    #[error("Write error: {0}")]
    Write(String),

    /// Malformed form record or frame body.
    #[error("Format error: {0}")]
    Format(String),

    /// Declared frame length outside `4..=max`.
    #[error("Frame length {length} outside allowed range 4..={max}")]
    FrameLength { length: u32, max: u32 },

    /// Authenticated decryption failed (wrong key, tampered or truncated
    /// ciphertext) or the key has an unusable length.
    #[error("Crypto error")]
    Crypto,

    /// Shared key is not a valid hex string.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Configuration text could not be parsed.
    #[error("Config error: {0}")]
    Config(String),

    /// No connection became available before the call timed out.
    #[error("No connection")]
    NoConnection,

    /// No response was matched before the call timed out.
    #[error("Timeout")]
    Timeout,

    /// Connection or component closed.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl FormlinkError {
    /// Whether this error must tear down the connection it occurred on
    /// without any attempt at recovery.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            FormlinkError::Format(_) | FormlinkError::FrameLength { .. } | FormlinkError::Crypto
        )
    }
}

/// Result type alias using FormlinkError.
pub type Result<T> = std::result::Result<T, FormlinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(FormlinkError::Crypto.is_fatal_to_connection());
        assert!(FormlinkError::Format("short".into()).is_fatal_to_connection());
        assert!(FormlinkError::FrameLength { length: 2, max: 16 }.is_fatal_to_connection());
        assert!(!FormlinkError::Timeout.is_fatal_to_connection());
        assert!(!FormlinkError::NoConnection.is_fatal_to_connection());
    }

    #[test]
    fn test_frame_length_message() {
        let err = FormlinkError::FrameLength { length: 2, max: 1024 };
        assert_eq!(err.to_string(), "Frame length 2 outside allowed range 4..=1024");
    }
}
