//! Authenticated encryption of frame payloads.
//!
//! Payloads are sealed with AES-GCM under the pre-shared key, using a fresh
//! random 96-bit nonce per frame and no associated data:
//! ```text
//! ┌────────────┬──────────────────────┬──────────────┐
//! │ Nonce      │ Ciphertext           │ Tag          │
//! │ 12 bytes   │ len(plaintext) bytes │ 16 bytes     │
//! └────────────┴──────────────────────┴──────────────┘
//! ```
//!
//! A 16-byte key selects AES-128-GCM and a 32-byte key AES-256-GCM. Any
//! other key length is accepted at construction and fails on first use.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use rand::RngCore;

use crate::error::{FormlinkError, Result};

/// Nonce size for AES-GCM (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size.
pub const TAG_SIZE: usize = 16;

/// Bytes a sealed payload adds on top of its plaintext.
pub const SEAL_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

#[derive(Clone)]
enum Variant {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
    Unusable { key_len: usize },
}

/// AES-GCM sealer/opener bound to one shared key.
#[derive(Clone)]
pub struct FrameCipher {
    variant: Variant,
}

impl FrameCipher {
    /// Build a cipher from raw key bytes.
    pub fn new(key: &[u8]) -> Self {
        let variant = match key.len() {
            16 => Aes128Gcm::new_from_slice(key).ok().map(|c| Variant::Aes128(Box::new(c))),
            32 => Aes256Gcm::new_from_slice(key).ok().map(|c| Variant::Aes256(Box::new(c))),
            _ => None,
        };
        Self {
            variant: variant.unwrap_or(Variant::Unusable { key_len: key.len() }),
        }
    }

    /// Check whether the key length selects a supported algorithm.
    pub fn is_usable(&self) -> bool {
        !matches!(self.variant, Variant::Unusable { .. })
    }

    /// Encrypt and authenticate `plaintext`, returning `nonce || ciphertext || tag`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);
        let nonce_ref = Nonce::from_slice(&nonce);

        let ciphertext = match &self.variant {
            Variant::Aes128(c) => c.encrypt(nonce_ref, plaintext),
            Variant::Aes256(c) => c.encrypt(nonce_ref, plaintext),
            Variant::Unusable { .. } => return Err(FormlinkError::Crypto),
        };
        let ciphertext = ciphertext.map_err(|_| FormlinkError::Crypto)?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Verify and decrypt a sealed payload.
    ///
    /// # Errors
    ///
    /// Returns `FormlinkError::Crypto` for a wrong key, any modified byte,
    /// a payload shorter than nonce + tag, or an unusable key.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < SEAL_OVERHEAD {
            return Err(FormlinkError::Crypto);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce);

        let plaintext = match &self.variant {
            Variant::Aes128(c) => c.decrypt(nonce, ciphertext),
            Variant::Aes256(c) => c.decrypt(nonce, ciphertext),
            Variant::Unusable { .. } => return Err(FormlinkError::Crypto),
        };
        plaintext.map_err(|_| FormlinkError::Crypto)
    }
}

impl std::fmt::Debug for FrameCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let algorithm = match &self.variant {
            Variant::Aes128(_) => "AES-128-GCM".to_string(),
            Variant::Aes256(_) => "AES-256-GCM".to_string(),
            Variant::Unusable { key_len } => format!("unusable ({}-byte key)", key_len),
        };
        f.debug_struct("FrameCipher").field("algorithm", &algorithm).finish()
    }
}
