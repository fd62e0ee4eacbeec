//! HKDF-SHA256 as used by the TLS 1.3 key schedule.

use crate::{error::ErrorRepr, hmac::HmacSha256, Digest, HashError};

const LABEL_PREFIX: &[u8] = b"tls13 ";

/// Returns the byte representation of an `HkdfLabel`.
///
/// ```text
/// struct {
///     uint16 length = out_len;
///     opaque label<7..255> = "tls13 " + label;
///     opaque context<0..255> = ctx;
/// } HkdfLabel;
/// ```
pub fn make_hkdf_label(label: &[u8], ctx: &[u8], out_len: u16) -> Vec<u8> {
    let mut hkdf_label = Vec::with_capacity(hkdf_label_length(label.len(), ctx.len()));
    hkdf_label.extend_from_slice(&out_len.to_be_bytes());
    hkdf_label.push((LABEL_PREFIX.len() + label.len()) as u8);
    hkdf_label.extend_from_slice(LABEL_PREFIX);
    hkdf_label.extend_from_slice(label);
    hkdf_label.push(ctx.len() as u8);
    hkdf_label.extend_from_slice(ctx);
    hkdf_label
}

/// Returns the message HMAC'd by a single-block HKDF-Expand-Label, the
/// `HkdfLabel` followed by the counter byte 0x01.
///
/// This is the input that is continued from a first block digest to obtain
/// the inner hash of an expansion.
pub fn hkdf_expand_input(label: &[u8], ctx: &[u8], out_len: u16) -> Vec<u8> {
    let mut input = make_hkdf_label(label, ctx, out_len);
    input.push(0x01);
    input
}

/// HKDF-Expand-Label for outputs of at most one hash length.
pub fn hkdf_expand_label(
    secret: &[u8],
    label: &[u8],
    ctx: &[u8],
    out_len: usize,
) -> Result<Vec<u8>, HashError> {
    if out_len > crate::sha256::DIGEST_LEN {
        return Err(ErrorRepr::OutputTooLong(out_len).into());
    }

    let t1 = HmacSha256::new(secret)?.finalize(&hkdf_expand_input(label, ctx, out_len as u16));
    Ok(t1[..out_len].to_vec())
}

/// HKDF-Extract, `HMAC(salt, ikm)`.
pub fn hkdf_extract(salt: &[u8], ikm: &[u8]) -> Result<Digest, HashError> {
    Ok(HmacSha256::new(salt)?.finalize(ikm))
}

// 2 : output length as u16
// 1 : label length as u8
// 6 : length of "tls13 "
// 1 : context length as u8
fn hkdf_label_length(label_len: usize, ctx_len: usize) -> usize {
    2 + 1 + LABEL_PREFIX.len() + label_len + 1 + ctx_len
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::hmac::{Hmac, Mac};

    #[test]
    fn test_make_hkdf_label() {
        for (label, ctx, hkdf_label, out_len) in test_fixtures() {
            assert_eq!(make_hkdf_label(label, &ctx, out_len), hkdf_label);
            assert_eq!(hkdf_label.len(), hkdf_label_length(label.len(), ctx.len()));
        }
    }

    #[test]
    fn test_expand_input_appends_counter() {
        let input = hkdf_expand_input(b"key", b"", 16);

        assert_eq!(input, from_hex_str("00 10 09 74 6c 73 31 33 20 6b 65 79 00 01"));
    }

    #[test]
    fn test_expand_label_against_reference() {
        let secret = from_hex_str(
            "b6 7b 7d 69 0c c1 6c 4e 75 e5 42 13 cb 2d 37 b4 e9 c9 12 bc de d9 10 5d 42 be fd 59 d3 91 ad 38",
        );

        for (label, ctx, _, out_len) in test_fixtures() {
            let mut mac = Hmac::<sha2::Sha256>::new_from_slice(&secret).unwrap();
            mac.update(&hkdf_expand_input(label, &ctx, out_len));
            let expected = mac.finalize().into_bytes();

            let out = hkdf_expand_label(&secret, label, &ctx, out_len as usize).unwrap();

            assert_eq!(out, expected[..out_len as usize].to_vec());
        }
    }

    // RFC 8448, simple 1-RTT handshake.
    #[test]
    fn test_rfc8448_server_handshake_key() {
        let shts = from_hex_str(
            "b6 7b 7d 69 0c c1 6c 4e 75 e5 42 13 cb 2d 37 b4 e9 c9 12 bc de d9 10 5d 42 be fd 59 d3 91 ad 38",
        );

        assert_eq!(
            hkdf_expand_label(&shts, b"key", b"", 16).unwrap(),
            from_hex_str("3f ce 51 60 09 c2 17 27 d0 f2 e4 e8 6e e4 03 bc")
        );
        assert_eq!(
            hkdf_expand_label(&shts, b"iv", b"", 12).unwrap(),
            from_hex_str("5d 31 3e b2 67 12 76 ee 13 00 0b 30")
        );
    }

    #[test]
    fn test_rfc8448_early_secret() {
        assert_eq!(
            hkdf_extract(&[0u8; 32], &[0u8; 32]).unwrap().to_vec(),
            from_hex_str(
                "33 ad 0a 1c 60 7e c0 3b 09 e6 cd 98 93 68 0c e2 10 ad f3 00 aa 1f 26 60 e1 b2 2e 10 f1 70 f9 2a"
            )
        );
    }

    #[test]
    fn test_output_too_long() {
        assert!(hkdf_expand_label(&[0u8; 32], b"key", b"", 33).is_err());
    }

    // Test vectors from https://datatracker.ietf.org/doc/html/draft-ietf-tls-tls13-vectors-06
    // (in that ref, `hash` is the context, `info` is the hkdf label).
    #[allow(clippy::type_complexity)]
    fn test_fixtures() -> Vec<(&'static [u8], Vec<u8>, Vec<u8>, u16)> {
        vec![
        (
            b"derived",
            from_hex_str("e3 b0 c4 42 98 fc 1c 14 9a fb f4 c8 99 6f b9 24 27 ae 41 e4 64 9b 93 4c a4 95 99 1b 78 52 b8 55"),
            from_hex_str("00 20 0d 74 6c 73 31 33 20 64 65 72 69 76 65 64 20 e3 b0 c4 42 98 fc 1c 14 9a fb f4 c8 99 6f b9 24 27 ae 41 e4 64 9b 93 4c a4 95 99 1b 78 52 b8 55"),
            32,
        ),
        (
            b"s hs traffic",
            from_hex_str("c6 c9 18 ad 2f 41 99 d5 59 8e af 01 16 cb 7a 5c 2c 14 cb 54 78 12 18 88 8d b7 03 0d d5 0d 5e 6d"),
            from_hex_str("00 20 12 74 6c 73 31 33 20 73 20 68 73 20 74 72 61 66 66 69 63 20 c6 c9 18 ad 2f 41 99 d5 59 8e af 01 16 cb 7a 5c 2c 14 cb 54 78 12 18 88 8d b7 03 0d d5 0d 5e 6d"),
            32,
        ),
        (
            b"key",
            from_hex_str(""),
            from_hex_str("00 10 09 74 6c 73 31 33 20 6b 65 79 00"),
            16,
        ),
        (
            b"iv",
            from_hex_str(""),
            from_hex_str("00 0c 08 74 6c 73 31 33 20 69 76 00"),
            12,
        ),
        (
            b"finished",
            from_hex_str(""),
            from_hex_str("00 20 0e 74 6c 73 31 33 20 66 69 6e 69 73 68 65 64 00"),
            32,
        ),
        (
            b"c ap traffic",
            from_hex_str("f8 c1 9e 8c 77 c0 38 79 bb c8 eb 6d 56 e0 0d d5 d8 6e f5 59 27 ee fc 08 e1 b0 02 b6 ec e0 5d bf"),
            from_hex_str("00 20 12 74 6c 73 31 33 20 63 20 61 70 20 74 72 61 66 66 69 63 20 f8 c1 9e 8c 77 c0 38 79 bb c8 eb 6d 56 e0 0d d5 d8 6e f5 59 27 ee fc 08 e1 b0 02 b6 ec e0 5d bf"),
            32,
        ),
        (
            b"s ap traffic",
            from_hex_str("f8 c1 9e 8c 77 c0 38 79 bb c8 eb 6d 56 e0 0d d5 d8 6e f5 59 27 ee fc 08 e1 b0 02 b6 ec e0 5d bf"),
            from_hex_str("00 20 12 74 6c 73 31 33 20 73 20 61 70 20 74 72 61 66 66 69 63 20 f8 c1 9e 8c 77 c0 38 79 bb c8 eb 6d 56 e0 0d d5 d8 6e f5 59 27 ee fc 08 e1 b0 02 b6 ec e0 5d bf"),
            32,
        ),
    ]
    }

    fn from_hex_str(s: &str) -> Vec<u8> {
        hex::decode(s.split_whitespace().collect::<String>()).unwrap()
    }
}
