//! SHA-256 compression with a caller-supplied chaining value.
//!
//! Hashing can start from any state, which is what allows a digest to be
//! continued from the state reached after the first 64-byte block.

use crate::{error::ErrorRepr, HashError};

/// SHA-256 block size in bytes.
pub const BLOCK_LEN: usize = 64;
/// SHA-256 digest size in bytes.
pub const DIGEST_LEN: usize = 32;

/// Standard SHA-256 initial hash value.
pub const SHA256_IV: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

const K: [u32; 64] = [
    0x428a2f98, 0x71374491, 0xb5c0fbcf, 0xe9b5dba5, 0x3956c25b, 0x59f111f1, 0x923f82a4, 0xab1c5ed5,
    0xd807aa98, 0x12835b01, 0x243185be, 0x550c7dc3, 0x72be5d74, 0x80deb1fe, 0x9bdc06a7, 0xc19bf174,
    0xe49b69c1, 0xefbe4786, 0x0fc19dc6, 0x240ca1cc, 0x2de92c6f, 0x4a7484aa, 0x5cb0a9dc, 0x76f988da,
    0x983e5152, 0xa831c66d, 0xb00327c8, 0xbf597fc7, 0xc6e00bf3, 0xd5a79147, 0x06ca6351, 0x14292967,
    0x27b70a85, 0x2e1b2138, 0x4d2c6dfc, 0x53380d13, 0x650a7354, 0x766a0abb, 0x81c2c92e, 0x92722c85,
    0xa2bfe8a1, 0xa81a664b, 0xc24b8b70, 0xc76c51a3, 0xd192e819, 0xd6990624, 0xf40e3585, 0x106aa070,
    0x19a4c116, 0x1e376c08, 0x2748774c, 0x34b0bcb5, 0x391c0cb3, 0x4ed8aa4a, 0x5b9cca4f, 0x682e6ff3,
    0x748f82ee, 0x78a5636f, 0x84c87814, 0x8cc70208, 0x90befffa, 0xa4506ceb, 0xbef9a3f7, 0xc67178f2,
];

/// How [`sha256_compress`] treats the end of the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// The message is already a whole number of blocks and is compressed as is.
    None,
    /// Standard SHA-256 padding is appended.
    Standard {
        /// Number of bytes already absorbed into the chaining value. Must be a
        /// multiple of the block size.
        previous_len: usize,
    },
}

/// Compresses `message` starting from the chaining value `iv`.
///
/// The returned bytes are the final chaining value, which with
/// [`Padding::Standard`] is the SHA-256 digest of everything hashed so far.
pub fn sha256_compress(
    message: &[u8],
    iv: &[u8; DIGEST_LEN],
    padding: Padding,
) -> Result<[u8; DIGEST_LEN], HashError> {
    let state = bytes_to_state(iv);

    let state = match padding {
        Padding::None => {
            if message.len() % BLOCK_LEN != 0 {
                return Err(ErrorRepr::UnalignedMessage(message.len()).into());
            }
            compress_blocks(state, message)
        }
        Padding::Standard { previous_len } => {
            if previous_len % BLOCK_LEN != 0 {
                return Err(ErrorRepr::UnalignedPreviousLength(previous_len).into());
            }
            sha256(state, previous_len, message)
        }
    };

    Ok(state_to_bytes(state))
}

/// Computes SHA-256 of `msg` continuing from `state`, where `pos` bytes have
/// already been absorbed.
pub(crate) fn sha256(state: [u32; 8], pos: usize, msg: &[u8]) -> [u32; 8] {
    let bit_len = ((pos + msg.len()) as u64) * 8;

    let mut padded = Vec::with_capacity(msg.len() + BLOCK_LEN + 8);
    padded.extend_from_slice(msg);
    padded.push(0x80);
    while padded.len() % BLOCK_LEN != BLOCK_LEN - 8 {
        padded.push(0);
    }
    padded.extend_from_slice(&bit_len.to_be_bytes());

    compress_blocks(state, &padded)
}

/// Compresses whole blocks of `data` into `state`.
///
/// `data.len()` must be a multiple of the block size, trailing bytes are ignored.
pub(crate) fn compress_blocks(mut state: [u32; 8], data: &[u8]) -> [u32; 8] {
    for block in data.chunks_exact(BLOCK_LEN) {
        compress_256(&mut state, block);
    }
    state
}

/// The SHA-256 compression function over a single 64-byte block.
pub(crate) fn compress_256(state: &mut [u32; 8], block: &[u8]) {
    let mut w = [0u32; 64];
    for (word, bytes) in w.iter_mut().zip(block.chunks_exact(4)) {
        *word = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }
    for i in 16..64 {
        let s0 = w[i - 15].rotate_right(7) ^ w[i - 15].rotate_right(18) ^ (w[i - 15] >> 3);
        let s1 = w[i - 2].rotate_right(17) ^ w[i - 2].rotate_right(19) ^ (w[i - 2] >> 10);
        w[i] = w[i - 16]
            .wrapping_add(s0)
            .wrapping_add(w[i - 7])
            .wrapping_add(s1);
    }

    let [mut a, mut b, mut c, mut d, mut e, mut f, mut g, mut h] = *state;

    for i in 0..64 {
        let s1 = e.rotate_right(6) ^ e.rotate_right(11) ^ e.rotate_right(25);
        let ch = (e & f) ^ (!e & g);
        let t1 = h
            .wrapping_add(s1)
            .wrapping_add(ch)
            .wrapping_add(K[i])
            .wrapping_add(w[i]);
        let s0 = a.rotate_right(2) ^ a.rotate_right(13) ^ a.rotate_right(22);
        let maj = (a & b) ^ (a & c) ^ (b & c);
        let t2 = s0.wrapping_add(maj);

        h = g;
        g = f;
        f = e;
        e = d.wrapping_add(t1);
        d = c;
        c = b;
        b = a;
        a = t1.wrapping_add(t2);
    }

    for (s, v) in state.iter_mut().zip([a, b, c, d, e, f, g, h]) {
        *s = s.wrapping_add(v);
    }
}

/// Serializes a chaining value big-endian.
pub fn state_to_bytes(state: [u32; 8]) -> [u8; DIGEST_LEN] {
    let mut bytes = [0u8; DIGEST_LEN];
    for (chunk, word) in bytes.chunks_exact_mut(4).zip(state) {
        chunk.copy_from_slice(&word.to_be_bytes());
    }
    bytes
}

/// Parses a big-endian chaining value.
pub fn bytes_to_state(bytes: &[u8; DIGEST_LEN]) -> [u32; 8] {
    let mut state = [0u32; 8];
    for (word, chunk) in state.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    state
}
