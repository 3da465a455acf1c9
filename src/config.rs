//! Configuration for clients and servers.
//!
//! Keys are pre-shared out of band as hex strings. Both configs can be
//! built in code or loaded from JSON; every tunable has a default, so a
//! minimal client config only names the key, address and port:
//!
//! ```
//! use formlink::config::ClientConfig;
//!
//! let config = ClientConfig::from_json(r#"{
//!     "key": "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff",
//!     "address": "127.0.0.1",
//!     "port": 3210
//! }"#).unwrap();
//!
//! assert_eq!(config.endpoint(), "127.0.0.1:3210");
//! assert_eq!(config.max_frame_size, 1024 * 1024);
//! ```
//!
//! Durations are expressed in milliseconds in JSON.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FormlinkError, Result};
use crate::protocol::{FrameCipher, DEFAULT_MAX_FRAME_SIZE};

/// Delay between failed connection attempts.
pub const DEFAULT_CONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Delay before reconnecting after an established connection is lost.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(10);

/// Delay between failed bind attempts.
pub const DEFAULT_BIND_BACKOFF: Duration = Duration::from_secs(5);

/// Default writer channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Pre-shared symmetric key.
///
/// Parsed from hex. The length is not checked here: a key of the wrong
/// length only surfaces as a `Crypto` error when a frame is sealed or opened.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SharedKey(Vec<u8>);

impl SharedKey {
    /// Decode a hex string.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if the string is not valid hex.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        hex::decode(hex_key.trim())
            .map(SharedKey)
            .map_err(|e| FormlinkError::InvalidKey(e.to_string()))
    }

    /// Wrap raw key bytes.
    pub fn from_bytes(key: impl Into<Vec<u8>>) -> Self {
        SharedKey(key.into())
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex encoding of the key.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Build the frame cipher for this key.
    pub fn cipher(&self) -> FrameCipher {
        FrameCipher::new(&self.0)
    }
}

impl TryFrom<String> for SharedKey {
    type Error = FormlinkError;

    fn try_from(value: String) -> Result<Self> {
        SharedKey::from_hex(&value)
    }
}

impl From<SharedKey> for String {
    fn from(key: SharedKey) -> Self {
        key.to_hex()
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedKey(<{} bytes>)", self.0.len())
    }
}

/// Configuration for a [`Client`](crate::Client).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Shared key, hex in JSON.
    pub key: SharedKey,
    /// Server host name or IP.
    pub address: String,
    /// Server port.
    pub port: u16,
    /// Wait after a failed connection attempt.
    #[serde(default = "default_connect_backoff", with = "duration_ms")]
    pub connect_backoff: Duration,
    /// Wait after an established connection is lost.
    #[serde(default = "default_reconnect_delay", with = "duration_ms")]
    pub reconnect_delay: Duration,
    /// Largest declared frame length accepted or produced.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: u32,
    /// Writer channel capacity.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl ClientConfig {
    /// Create a config with default tunables.
    pub fn new(key: SharedKey, address: impl Into<String>, port: u16) -> Self {
        Self {
            key,
            address: address.into(),
            port,
            connect_backoff: DEFAULT_CONNECT_BACKOFF,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Load from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| FormlinkError::Config(e.to_string()))
    }

    /// `address:port`, the dial target and registry key.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Configuration for a [`Server`](crate::Server).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Shared key, hex in JSON.
    pub key: SharedKey,
    /// Interface to bind.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Port to bind; 0 picks an ephemeral port.
    pub port: u16,
    /// Wait after a failed bind.
    #[serde(default = "default_bind_backoff", with = "duration_ms")]
    pub bind_backoff: Duration,
    /// Largest declared frame length accepted or produced.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: u32,
    /// Per-connection writer channel capacity.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl ServerConfig {
    /// Create a config bound to all interfaces with default tunables.
    pub fn new(key: SharedKey, port: u16) -> Self {
        Self {
            key,
            bind_address: default_bind_address(),
            port,
            bind_backoff: DEFAULT_BIND_BACKOFF,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Load from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| FormlinkError::Config(e.to_string()))
    }

    /// `bind_address:port`.
    pub fn bind_endpoint(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

fn default_connect_backoff() -> Duration {
    DEFAULT_CONNECT_BACKOFF
}

fn default_reconnect_delay() -> Duration {
    DEFAULT_RECONNECT_DELAY
}

fn default_bind_backoff() -> Duration {
    DEFAULT_BIND_BACKOFF
}

fn default_max_frame_size() -> u32 {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Durations as integer milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_HEX: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

    #[test]
    fn test_key_from_hex() {
        let key = SharedKey::from_hex(KEY_HEX).unwrap();
        assert_eq!(key.as_bytes().len(), 32);
        assert_eq!(key.as_bytes()[1], 0x11);
        assert_eq!(key.to_hex(), KEY_HEX);
        assert!(key.cipher().is_usable());
    }

    #[test]
    fn test_key_rejects_non_hex() {
        assert!(matches!(
            SharedKey::from_hex("not hex"),
            Err(FormlinkError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_key_length_not_validated() {
        let key = SharedKey::from_hex("abcd").unwrap();
        assert_eq!(key.as_bytes(), &[0xab, 0xcd]);
        assert!(!key.cipher().is_usable());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = SharedKey::from_hex(KEY_HEX).unwrap();
        let shown = format!("{:?}", key);
        assert_eq!(shown, "SharedKey(<32 bytes>)");
    }

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::new(SharedKey::from_bytes(vec![0; 32]), "localhost", 3210);
        assert_eq!(config.endpoint(), "localhost:3210");
        assert_eq!(config.connect_backoff, Duration::from_secs(1));
        assert_eq!(config.reconnect_delay, Duration::from_millis(10));
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn test_client_config_json_overrides() {
        let json = format!(
            r#"{{"key": "{}", "address": "10.0.0.1", "port": 9000, "connect_backoff": 250, "max_frame_size": 4096}}"#,
            KEY_HEX
        );
        let config = ClientConfig::from_json(&json).unwrap();
        assert_eq!(config.connect_backoff, Duration::from_millis(250));
        assert_eq!(config.reconnect_delay, DEFAULT_RECONNECT_DELAY);
        assert_eq!(config.max_frame_size, 4096);
    }

    #[test]
    fn test_server_config_json() {
        let json = format!(r#"{{"key": "{}", "port": 3210}}"#, KEY_HEX);
        let config = ServerConfig::from_json(&json).unwrap();
        assert_eq!(config.bind_endpoint(), "0.0.0.0:3210");
        assert_eq!(config.bind_backoff, Duration::from_secs(5));
    }

    #[test]
    fn test_config_json_rejects_bad_key() {
        let err = ServerConfig::from_json(r#"{"key": "zz", "port": 1}"#).unwrap_err();
        assert!(matches!(err, FormlinkError::Config(_)));
    }

    #[test]
    fn test_config_serializes_back() {
        let config = ServerConfig::new(SharedKey::from_hex(KEY_HEX).unwrap(), 1234);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(KEY_HEX));
        assert!(json.contains("\"bind_backoff\":5000"));
        let back = ServerConfig::from_json(&json).unwrap();
        assert_eq!(back.key, config.key);
    }
}
