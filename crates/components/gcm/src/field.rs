//! GF(2^128) arithmetic in GCM's bit-reflected representation.

use crate::Block;

/// Reduction of the 4 bits shifted out of `high` on each multiplication step,
/// modulo 1 + x + x^2 + x^7 + x^128.
const REDUCTION_TABLE: [u16; 16] = [
    0x0000, 0x1c20, 0x3840, 0x2460, 0x7080, 0x6ca0, 0x48c0, 0x54e0, 0xe100, 0xfd20, 0xd940,
    0xc560, 0x9180, 0x8da0, 0xa9c0, 0xb5e0,
];

/// A field element.
///
/// `low` holds the first 8 bytes of the block and `high` the last 8, both
/// big-endian, so the coefficient of x^0 is the most significant bit of `low`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FieldElement {
    pub(crate) low: u64,
    pub(crate) high: u64,
}

impl FieldElement {
    pub(crate) fn from_block(block: &Block) -> Self {
        let mut low = [0u8; 8];
        let mut high = [0u8; 8];
        low.copy_from_slice(&block[..8]);
        high.copy_from_slice(&block[8..]);

        Self {
            low: u64::from_be_bytes(low),
            high: u64::from_be_bytes(high),
        }
    }

    pub(crate) fn to_block(self) -> Block {
        let mut block = [0u8; 16];
        block[..8].copy_from_slice(&self.low.to_be_bytes());
        block[8..].copy_from_slice(&self.high.to_be_bytes());
        block
    }

    pub(crate) fn xor(self, rhs: Self) -> Self {
        Self {
            low: self.low ^ rhs.low,
            high: self.high ^ rhs.high,
        }
    }

    /// Multiplies by x.
    pub(crate) fn double(self) -> Self {
        let carry = self.high & 1 == 1;

        let mut out = Self {
            high: (self.high >> 1) | (self.low << 63),
            low: self.low >> 1,
        };
        if carry {
            out.low ^= 0xe100000000000000;
        }

        out
    }
}

/// Multiples of a fixed element H by every 4-bit polynomial, indexed by the
/// bit-reversed nibble.
#[derive(Clone)]
pub(crate) struct ProductTable([FieldElement; 16]);

impl ProductTable {
    pub(crate) fn new(h: FieldElement) -> Self {
        let mut table = [FieldElement::default(); 16];
        table[reverse_bits(1)] = h;

        for i in (2..16).step_by(2) {
            table[reverse_bits(i)] = table[reverse_bits(i / 2)].double();
            table[reverse_bits(i + 1)] = table[reverse_bits(i)].xor(h);
        }

        Self(table)
    }

    /// Returns `y * H`, consuming four bits of `y` per step.
    pub(crate) fn mul(&self, y: FieldElement) -> FieldElement {
        let mut z = FieldElement::default();

        for mut word in [y.high, y.low] {
            for _ in (0..64).step_by(4) {
                let msw = z.high & 0xf;
                z.high >>= 4;
                z.high |= z.low << 60;
                z.low >>= 4;
                z.low ^= u64::from(REDUCTION_TABLE[msw as usize]) << 48;

                let t = self.0[(word & 0xf) as usize];
                z.low ^= t.low;
                z.high ^= t.high;

                word >>= 4;
            }
        }

        z
    }
}

fn reverse_bits(i: usize) -> usize {
    let i = i as u8;
    ((i & 0x1) << 3 | (i & 0x2) << 1 | (i & 0x4) >> 1 | (i & 0x8) >> 3) as usize
}
