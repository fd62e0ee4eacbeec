/// AES-GCM error.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GcmError {
    /// Key is not 16, 24 or 32 bytes long.
    #[error("invalid AES key length: {0}")]
    InvalidKeyLength(usize),
    /// Nonce is empty.
    #[error("nonce must not be empty")]
    EmptyNonce,
    /// Input is too short to carry a tag.
    #[error("ciphertext too short: {len} < {min}")]
    CiphertextTooShort {
        /// Actual length.
        len: usize,
        /// Minimum length.
        min: usize,
    },
    /// Tag did not match.
    #[error("message authentication failed")]
    AuthenticationFailed,
}
