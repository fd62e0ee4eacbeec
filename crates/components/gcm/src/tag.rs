//! Tag recomputation without the cipher key.
//!
//! A GCM tag only depends on the key through `ECB0 = E_k(0^128)` and
//! `ECBK = E_k(J0)`, so a party holding those two blocks can check that a
//! ciphertext and tag belong together while the key stays undisclosed.

use crate::{Block, GHash, GcmError, TAG_SIZE};

/// Outcome of recomputing a tag from disclosed GCM ingredients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagCheck {
    /// The recomputed tag equals the disclosed one.
    Match,
    /// The recomputed tag differs from the disclosed one.
    Mismatch,
}

impl TagCheck {
    /// Returns `true` if the tag matched.
    pub fn is_match(&self) -> bool {
        matches!(self, TagCheck::Match)
    }
}

/// Computes the GCM tag of `ciphertext` from `ecb0` and `ecbk`.
pub fn compute_tag(ecb0: &Block, ecbk: &Block, aad: &[u8], ciphertext: &[u8]) -> Block {
    let mut tag = GHash::new(ecb0).authenticate(aad, ciphertext);
    tag.iter_mut().zip(ecbk).for_each(|(t, m)| *t ^= m);
    tag
}

/// Returns `cipher_chunks` with its recomputed tag appended.
pub fn seal_tag(ecb0: &Block, ecbk: &Block, aad: &[u8], cipher_chunks: &[u8]) -> Vec<u8> {
    let tag = compute_tag(ecb0, ecbk, aad, cipher_chunks);

    let mut out = Vec::with_capacity(cipher_chunks.len() + TAG_SIZE);
    out.extend_from_slice(cipher_chunks);
    out.extend_from_slice(&tag);
    out
}

/// Recomputes the tag of `ciphertext`, whose last 16 bytes are the disclosed
/// tag, and compares the two.
pub fn check_tag(
    ecb0: &Block,
    ecbk: &Block,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<TagCheck, GcmError> {
    if ciphertext.len() < TAG_SIZE {
        return Err(GcmError::CiphertextTooShort {
            len: ciphertext.len(),
            min: TAG_SIZE,
        });
    }

    let (cipher_chunks, tag) = ciphertext.split_at(ciphertext.len() - TAG_SIZE);
    let expected = compute_tag(ecb0, ecbk, aad, cipher_chunks);

    Ok(if tags_equal(&expected, tag) {
        TagCheck::Match
    } else {
        TagCheck::Mismatch
    })
}

/// Compares tags without exiting early on the first differing byte.
pub(crate) fn tags_equal(expected: &Block, actual: &[u8]) -> bool {
    if actual.len() != expected.len() {
        return false;
    }

    expected
        .iter()
        .zip(actual)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
