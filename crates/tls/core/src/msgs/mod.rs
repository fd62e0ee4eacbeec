//! TLS message encodings.

pub mod codec;
pub mod enums;
pub mod handshake;
