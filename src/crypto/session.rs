//! ChaCha20-Poly1305 session cipher for DATA payloads
//!
//! The session key for a pair of members is derived from their ids alone,
//! so both sides reconstruct it without a handshake: the receiver hashes
//! the ordered pair of (sender, self) and gets the key the sender used.
//! Each seal draws a fresh 12-byte nonce which travels in front of the
//! ciphertext.

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use sha2::{Digest, Sha256};

use crate::crypto::{CryptoError, DataCipher};

/// Session key length (SHA-256 output)
pub const SESSION_KEY_SIZE: usize = 32;

/// AEAD nonce length
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag length
pub const TAG_SIZE: usize = 16;

/// Domain-separation byte in front of the hashed id pair
const KEY_DOMAIN: u8 = 0x5A;

/// Derives the symmetric key for a pair of member ids
///
/// `SHA-256(0x5A || min(a,b) || max(a,b))` with the ids big-endian, so
/// the key is the same regardless of which side derives it.
pub fn derive_session_key(id_a: u64, id_b: u64) -> [u8; SESSION_KEY_SIZE] {
    let (lo, hi) = if id_a <= id_b { (id_a, id_b) } else { (id_b, id_a) };
    let mut hasher = Sha256::new();
    hasher.update([KEY_DOMAIN]);
    hasher.update(lo.to_be_bytes());
    hasher.update(hi.to_be_bytes());
    hasher.finalize().into()
}

/// Pair-keyed ChaCha20-Poly1305 cipher
///
/// Stateless: the key is re-derived per call, which keeps the cipher free
/// of interior mutability and safe to share behind an `Arc`.
pub struct SessionCipher {}

impl SessionCipher {
    pub fn new() -> Self {
        Self {}
    }

    fn generate_nonce() -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        nonce
    }
}

impl DataCipher for SessionCipher {
    /// Seals `data` in-place
    ///
    /// Output layout: `nonce(12) || ciphertext || tag(16)`, the tag being
    /// appended by the AEAD itself.
    fn seal(&self, local_id: u64, remote_id: u64, data: &mut Vec<u8>) -> crate::Result<()> {
        let key = derive_session_key(local_id, remote_id);
        let cipher = ChaCha20Poly1305::new(&key.into());

        let nonce_bytes = Self::generate_nonce();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, data.as_ref())
            .map_err(|e| format!("seal failed: {}", e))?;

        data.clear();
        data.extend_from_slice(&nonce_bytes);
        data.extend_from_slice(&ciphertext);
        Ok(())
    }

    /// Opens `data` in-place
    ///
    /// Expects `nonce(12) || ciphertext || tag(16)`. Anything shorter
    /// than an empty envelope, or anything that fails tag verification,
    /// is an authentication failure and the packet is dropped upstream.
    fn open(&self, local_id: u64, remote_id: u64, data: &mut Vec<u8>) -> crate::Result<()> {
        if data.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::AuthFailed.into());
        }

        let key = derive_session_key(local_id, remote_id);
        let cipher = ChaCha20Poly1305::new(&key.into());

        let nonce = Nonce::from_slice(&data[0..NONCE_SIZE]);
        let plaintext = cipher
            .decrypt(nonce, &data[NONCE_SIZE..])
            .map_err(|_| CryptoError::AuthFailed)?;

        data.clear();
        data.extend_from_slice(&plaintext);
        Ok(())
    }
}

impl Default for SessionCipher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_symmetric_over_the_pair() {
        assert_eq!(derive_session_key(1, 2), derive_session_key(2, 1));
        assert_ne!(derive_session_key(1, 2), derive_session_key(1, 3));
    }

    #[test]
    fn test_seal_open_round_trip() {
        let cipher = SessionCipher::new();
        let original = b"45 00 00 1c ... an ip datagram".to_vec();

        let mut data = original.clone();
        cipher.seal(7, 9, &mut data).unwrap();
        assert_ne!(data, original);
        assert_eq!(data.len(), original.len() + NONCE_SIZE + TAG_SIZE);

        // receiver derives from the reversed pair
        cipher.open(9, 7, &mut data).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn test_open_rejects_tampering() {
        let cipher = SessionCipher::new();
        let mut data = b"payload".to_vec();
        cipher.seal(1, 2, &mut data).unwrap();

        data[NONCE_SIZE] ^= 0xFF;
        let err = cipher.open(1, 2, &mut data).unwrap_err();
        assert_eq!(
            err.downcast_ref::<CryptoError>(),
            Some(&CryptoError::AuthFailed)
        );
    }

    #[test]
    fn test_open_rejects_wrong_pair() {
        let cipher = SessionCipher::new();
        let mut data = b"payload".to_vec();
        cipher.seal(1, 2, &mut data).unwrap();
        assert!(cipher.open(1, 3, &mut data).is_err());
    }

    #[test]
    fn test_open_rejects_truncated_envelope() {
        let cipher = SessionCipher::new();
        let mut data = vec![0u8; NONCE_SIZE + TAG_SIZE - 1];
        let err = cipher.open(1, 2, &mut data).unwrap_err();
        assert_eq!(
            err.downcast_ref::<CryptoError>(),
            Some(&CryptoError::AuthFailed)
        );
    }

    #[test]
    fn test_nonce_freshness() {
        let cipher = SessionCipher::new();
        let mut first = b"same plaintext".to_vec();
        let mut second = b"same plaintext".to_vec();
        cipher.seal(1, 2, &mut first).unwrap();
        cipher.seal(1, 2, &mut second).unwrap();
        assert_ne!(first, second);
    }
}
