//! Running handshake transcript.

use sha2::{Digest, Sha256};

use crate::msgs::handshake::HandshakeMessage;

/// Accumulates the raw encodings of handshake messages.
///
/// The full buffer is kept so a hash can be taken at any point in the
/// handshake.
#[derive(Debug, Clone, Default)]
pub struct HandshakeHash {
    buffer: Vec<u8>,
}

impl HandshakeHash {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a decoded message.
    pub fn add_message(&mut self, msg: &HandshakeMessage) {
        self.add_raw(msg.encoding());
    }

    /// Appends raw bytes.
    pub fn add_raw(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Returns SHA-256 of everything added so far.
    pub fn current_hash(&self) -> [u8; 32] {
        Sha256::digest(&self.buffer).into()
    }

    /// Returns the accumulated bytes.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hash() {
        assert_eq!(
            hex::encode(HandshakeHash::new().current_hash()),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_incremental() {
        let mut hash = HandshakeHash::new();
        hash.add_raw(b"ab");
        hash.add_raw(b"c");

        assert_eq!(hash.current_hash(), <[u8; 32]>::from(Sha256::digest(b"abc")));
        assert_eq!(hash.buffer(), b"abc");
    }
}
