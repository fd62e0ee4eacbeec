/// Error for hashing and key derivation helpers.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct HashError(#[from] ErrorRepr);

#[derive(Debug, thiserror::Error)]
pub(crate) enum ErrorRepr {
    #[error("message length {0} is not a multiple of the block size")]
    UnalignedMessage(usize),
    #[error("previous length {0} is not a multiple of the block size")]
    UnalignedPreviousLength(usize),
    #[error("hmac key longer than one block: {0} bytes")]
    KeyTooLong(usize),
    #[error("invalid chaining value length, expected: 32, actual: {0}")]
    StateLength(usize),
    #[error("hkdf output length {0} exceeds a single hash block")]
    OutputTooLong(usize),
}
