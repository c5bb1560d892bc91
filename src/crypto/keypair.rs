//! Long-term Ed25519 identity keys
//!
//! Clients may persist a keypair across runs. The file format is the raw
//! 32-byte secret key followed by the 32-byte public key; nothing in the
//! default configuration consumes the keys yet, they exist so a member
//! identity can outlive a process.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::Rng;

/// Secret and public key lengths
pub const KEY_SIZE: usize = 32;

/// On-disk size: secret key followed by public key
pub const KEYPAIR_FILE_SIZE: usize = KEY_SIZE * 2;

/// A long-term Ed25519 keypair
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generates a fresh keypair from OS randomness
    pub fn generate() -> Self {
        let mut secret = [0u8; KEY_SIZE];
        rand::rng().fill(&mut secret[..]);
        Keypair {
            signing: SigningKey::from_bytes(&secret),
        }
    }

    /// Loads a keypair from `path`
    ///
    /// Rejects files of the wrong size and files whose stored public key
    /// does not match the secret half, which catches truncated or
    /// hand-edited key files before they are trusted.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let bytes = std::fs::read(path)?;
        if bytes.len() != KEYPAIR_FILE_SIZE {
            return Err(format!(
                "keypair file {} has {} bytes, expected {}",
                path.display(),
                bytes.len(),
                KEYPAIR_FILE_SIZE
            )
            .into());
        }

        let mut secret = [0u8; KEY_SIZE];
        secret.copy_from_slice(&bytes[..KEY_SIZE]);
        let signing = SigningKey::from_bytes(&secret);

        if signing.verifying_key().to_bytes() != bytes[KEY_SIZE..] {
            return Err(format!("keypair file {} is corrupt", path.display()).into());
        }
        Ok(Keypair { signing })
    }

    /// Writes the keypair to `path` in the 32+32 layout
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let mut bytes = Vec::with_capacity(KEYPAIR_FILE_SIZE);
        bytes.extend_from_slice(&self.signing.to_bytes());
        bytes.extend_from_slice(&self.signing.verifying_key().to_bytes());
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Loads the keypair at `path`, generating and saving one on first run
    pub fn load_or_generate(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let kp = Self::load(path)?;
            tracing::info!("loaded keypair from {}", path.display());
            Ok(kp)
        } else {
            let kp = Self::generate();
            kp.save(path)?;
            tracing::info!("generated new keypair, saved to {}", path.display());
            Ok(kp)
        }
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    pub fn public_bytes(&self) -> [u8; KEY_SIZE] {
        self.signing.verifying_key().to_bytes()
    }

    /// Public key in base64, for logs and operator eyes
    pub fn public_base64(&self) -> String {
        STANDARD.encode(self.public_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("meshtun-keypair-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_save_load_round_trip() {
        let path = temp_path("roundtrip");
        let kp = Keypair::generate();
        kp.save(&path).unwrap();

        let loaded = Keypair::load(&path).unwrap();
        assert_eq!(loaded.public_bytes(), kp.public_bytes());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_or_generate_persists() {
        let path = temp_path("persist");
        let _ = std::fs::remove_file(&path);

        let first = Keypair::load_or_generate(&path).unwrap();
        let second = Keypair::load_or_generate(&path).unwrap();
        assert_eq!(first.public_bytes(), second.public_bytes());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_rejects_wrong_size() {
        let path = temp_path("short");
        std::fs::write(&path, [0u8; 33]).unwrap();
        assert!(Keypair::load(&path).is_err());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_rejects_mismatched_halves() {
        let path = temp_path("mismatch");
        let kp = Keypair::generate();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&kp.signing.to_bytes());
        bytes.extend_from_slice(&[0u8; KEY_SIZE]);
        std::fs::write(&path, bytes).unwrap();
        assert!(Keypair::load(&path).is_err());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_public_base64_is_printable() {
        let kp = Keypair::generate();
        let b64 = kp.public_base64();
        assert_eq!(b64.len(), 44);
    }
}
