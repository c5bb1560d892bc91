//! Cryptographic module for the optional data-path envelope
//!
//! DATA payloads can be sealed with ChaCha20-Poly1305 under a session key
//! derived from the two endpoint ids, or passed through as plaintext.
//! Whether sealing is on is a deployment choice for the whole network;
//! there is no per-packet flag, so mixing sealed and plaintext members in
//! one overlay is not supported.

pub mod keypair;
pub mod plain;
pub mod session;

use std::fmt;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::crypto::plain::PlainCipher;
use crate::crypto::session::SessionCipher;

/// Data-path seal/open failures
#[derive(Debug, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD open failed: wrong pair key, tampering, or a truncated envelope
    AuthFailed,
}

impl std::error::Error for CryptoError {}

impl Display for CryptoError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CryptoError::AuthFailed => "authenticated open failed".fmt(fmt),
        }
    }
}

/// Seal/open interface for DATA payloads
///
/// Implementations work in-place on the payload vector and are keyed by
/// the unordered pair of member ids, so both directions of a session use
/// the same key. Marked `Send + Sync` for use behind an `Arc` across the
/// loop and the device task.
pub trait DataCipher: Send + Sync {
    /// Seals `data` in-place for the (`local_id`, `remote_id`) session
    fn seal(&self, local_id: u64, remote_id: u64, data: &mut Vec<u8>) -> crate::Result<()>;

    /// Opens `data` in-place; fails with [`CryptoError::AuthFailed`] when
    /// the envelope does not verify
    fn open(&self, local_id: u64, remote_id: u64, data: &mut Vec<u8>) -> crate::Result<()>;
}

/// Data-path cipher selection
///
/// Serialized lowercase for TOML and CLI compatibility: `"plain"` or
/// `"chacha20"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CryptoConfig {
    /// No sealing, payloads travel as-is
    Plain,
    /// ChaCha20-Poly1305 under the derived pair key
    ChaCha20,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        CryptoConfig::Plain
    }
}

impl std::str::FromStr for CryptoConfig {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(CryptoConfig::Plain),
            "chacha20" => Ok(CryptoConfig::ChaCha20),
            other => Err(format!("unknown cipher {:?} (expected plain or chacha20)", other).into()),
        }
    }
}

/// Factory for cipher instances from configuration
pub fn new_cipher(cfg: &CryptoConfig) -> Box<dyn DataCipher> {
    match cfg {
        CryptoConfig::Plain => Box::new(PlainCipher::new()),
        CryptoConfig::ChaCha20 => Box::new(SessionCipher::new()),
    }
}
