//! Plain (no-op) data-path cipher
//!
//! Passthrough implementation used when the deployment runs without the
//! AEAD envelope. Seal and open are identity functions, so a network of
//! plain members carries raw IP datagrams in its DATA packets.

use crate::crypto::DataCipher;

/// No-op cipher, the default configuration
pub struct PlainCipher {}

impl PlainCipher {
    pub fn new() -> Self {
        Self {}
    }
}

impl DataCipher for PlainCipher {
    fn seal(&self, _local_id: u64, _remote_id: u64, _data: &mut Vec<u8>) -> crate::Result<()> {
        Ok(())
    }

    fn open(&self, _local_id: u64, _remote_id: u64, _data: &mut Vec<u8>) -> crate::Result<()> {
        Ok(())
    }
}

impl Default for PlainCipher {
    fn default() -> Self {
        Self::new()
    }
}
