//! SHA-256, HMAC-SHA256 and the TLS 1.3 HKDF helpers, with the compression
//! state after the first HMAC block exposed.
//!
//! HMAC-SHA256 is defined as
//!
//! HMAC(m) = H((key' xor opad) || H((key' xor ipad) || m))
//!
//! Both the inner and the outer hash start with one block that depends only
//! on the key. Compressing that block yields a "first block digest" which can
//! be disclosed and continued with [`hmac_continue`] without revealing the key.

#![deny(missing_docs, unreachable_pub, unused_must_use)]
#![deny(clippy::all)]
#![forbid(unsafe_code)]

mod error;
pub mod hkdf;
mod hmac;
pub mod sha256;

pub use self::{
    error::HashError,
    hkdf::{hkdf_expand_input, hkdf_expand_label, hkdf_extract, make_hkdf_label},
    hmac::{first_block_digest, hmac_continue, hmac_sha256, HmacPad, HmacSha256},
    sha256::{sha256_compress, Padding},
};

/// A SHA-256 digest or chaining value.
pub type Digest = [u8; sha256::DIGEST_LEN];
