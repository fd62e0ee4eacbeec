//! AES-GCM for replaying TLS 1.3 records.
//!
//! Besides conventional [`AesGcm::seal`] and [`AesGcm::open`], this crate
//! exposes the two block-cipher outputs GCM authentication depends on:
//! `ECB0 = E_k(0^128)`, the GHASH key, and `ECBK = E_k(J0)`, the tag mask.
//! With those two values a tag can be recomputed without knowledge of the key,
//! see [`compute_tag`] and [`check_tag`].
//!
//! The GF(2^128) multiplication is table driven and is not constant time.

#![deny(missing_docs, unreachable_pub, unused_must_use)]
#![deny(clippy::all)]
#![forbid(unsafe_code)]

mod aes;
mod aes_gcm;
mod error;
mod field;
mod ghash;
mod tag;

pub use self::{
    aes::Aes,
    aes_gcm::AesGcm,
    error::GcmError,
    ghash::GHash,
    tag::{check_tag, compute_tag, seal_tag, TagCheck},
};

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;
/// GCM authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;
/// Standard GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// A 16-byte block.
pub type Block = [u8; BLOCK_SIZE];
