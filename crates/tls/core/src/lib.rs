//! TLS 1.3 replay over captured session bytes.
//!
//! This crate frames the raw bytes a client sent and received during an
//! ordinary TLS 1.3 session, decrypts the protected records once the traffic
//! secrets are known and walks the server handshake flight through the
//! expected message sequence. Only TLS 1.3 with `TLS_AES_128_GCM_SHA256` is
//! supported.
//!
//! The entry point is [`HandshakeReplay`], which yields a [`ServerHandshake`]
//! holding the decoded messages, the raw encodings needed for transcript
//! hashing and the remaining application data records.

#![deny(missing_docs, unreachable_pub, unused_must_use)]
#![deny(clippy::all)]
#![forbid(unsafe_code)]

#[cfg(feature = "logging")]
use tracing as log;

#[cfg(not(feature = "logging"))]
#[macro_use]
mod log {
    macro_rules! trace    ( ($($tt:tt)*) => {{}} );
    macro_rules! debug    ( ($($tt:tt)*) => {{}} );
    macro_rules! warn     ( ($($tt:tt)*) => {{}} );
}

pub mod anchors;
pub mod cipher;
mod error;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
pub mod hash_hs;
pub mod msgs;
pub mod record;
pub mod replay;
pub mod verify;

pub use error::TlsError;
pub use replay::{HandshakeReplay, ServerHandshake};
