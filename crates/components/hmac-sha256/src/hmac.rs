//! HMAC-SHA256 split at the first compressed block.
//!
//! * `key'`  - key padded with zero bytes to 64 bytes (longer keys are not
//!   supported)
//! * first block digest - `compress(IV, key' xor pad)`
//! * continuation - SHA-256 of the message resumed from that digest with 64
//!   bytes already absorbed

use crate::{
    error::ErrorRepr,
    sha256::{compress_blocks, sha256, state_to_bytes, BLOCK_LEN, DIGEST_LEN, SHA256_IV},
    Digest, HashError,
};

/// HMAC pad selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmacPad {
    /// `ipad`, 0x36.
    Inner,
    /// `opad`, 0x5c.
    Outer,
}

impl HmacPad {
    /// Returns the pad byte.
    pub fn byte(&self) -> u8 {
        match self {
            HmacPad::Inner => 0x36,
            HmacPad::Outer => 0x5c,
        }
    }
}

fn padded_key_block(key: &[u8], pad: HmacPad) -> Result<[u8; BLOCK_LEN], HashError> {
    if key.len() > BLOCK_LEN {
        return Err(ErrorRepr::KeyTooLong(key.len()).into());
    }

    let mut block = [pad.byte(); BLOCK_LEN];
    block.iter_mut().zip(key).for_each(|(b, k)| *b ^= k);

    Ok(block)
}

/// Computes the chaining value after compressing `key' xor pad` from the
/// standard IV.
pub fn first_block_digest(key: &[u8], pad: HmacPad) -> Result<Digest, HashError> {
    let block = padded_key_block(key, pad)?;
    Ok(state_to_bytes(compress_blocks(SHA256_IV, &block)))
}

/// Finishes an HMAC pass over `message` starting from a disclosed first block
/// digest.
///
/// With an `ipad` digest this is the inner hash, with an `opad` digest and the
/// inner hash as message it is the HMAC output.
pub fn hmac_continue(message: &[u8], first_block_digest: &[u8]) -> Result<Digest, HashError> {
    let state: &[u8; DIGEST_LEN] = first_block_digest
        .try_into()
        .map_err(|_| ErrorRepr::StateLength(first_block_digest.len()))?;

    Ok(state_to_bytes(sha256(
        crate::sha256::bytes_to_state(state),
        BLOCK_LEN,
        message,
    )))
}

/// HMAC-SHA256 keyed by its two first block digests.
#[derive(Clone, PartialEq, Eq)]
pub struct HmacSha256 {
    inner_partial: Digest,
    outer_partial: Digest,
}

impl std::fmt::Debug for HmacSha256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSha256").finish_non_exhaustive()
    }
}

impl HmacSha256 {
    /// Creates a new instance from `key`.
    pub fn new(key: &[u8]) -> Result<Self, HashError> {
        Ok(Self {
            inner_partial: first_block_digest(key, HmacPad::Inner)?,
            outer_partial: first_block_digest(key, HmacPad::Outer)?,
        })
    }

    /// Creates an instance from disclosed first block digests.
    pub fn from_partials(inner_partial: Digest, outer_partial: Digest) -> Self {
        Self {
            inner_partial,
            outer_partial,
        }
    }

    /// Returns the `ipad` first block digest.
    pub fn inner_partial(&self) -> &Digest {
        &self.inner_partial
    }

    /// Returns the `opad` first block digest.
    pub fn outer_partial(&self) -> &Digest {
        &self.outer_partial
    }

    /// Returns the inner hash `H((key' xor ipad) || msg)`.
    pub fn inner_hash(&self, msg: &[u8]) -> Digest {
        state_to_bytes(sha256(
            crate::sha256::bytes_to_state(&self.inner_partial),
            BLOCK_LEN,
            msg,
        ))
    }

    /// Computes HMAC over `msg`.
    pub fn finalize(&self, msg: &[u8]) -> Digest {
        let inner = self.inner_hash(msg);
        state_to_bytes(sha256(
            crate::sha256::bytes_to_state(&self.outer_partial),
            BLOCK_LEN,
            &inner,
        ))
    }
}

/// Computes HMAC-SHA256 of `msg` under `key`.
pub fn hmac_sha256(key: &[u8], msg: &[u8]) -> Result<Digest, HashError> {
    Ok(HmacSha256::new(key)?.finalize(msg))
}
