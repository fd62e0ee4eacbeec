//! GHASH over the additional data, the ciphertext and their bit lengths.

use crate::{
    field::{FieldElement, ProductTable},
    Block, BLOCK_SIZE,
};

/// GHASH keyed by `H = E_k(0^128)`.
#[derive(Clone)]
pub struct GHash {
    table: ProductTable,
}

impl std::fmt::Debug for GHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GHash").finish_non_exhaustive()
    }
}

impl GHash {
    /// Creates a new GHASH instance from the hash key `h`.
    pub fn new(h: &Block) -> Self {
        Self {
            table: ProductTable::new(FieldElement::from_block(h)),
        }
    }

    /// Absorbs `data` into `y`, zero padding the final partial block.
    pub(crate) fn update(&self, y: &mut FieldElement, data: &[u8]) {
        let mut chunks = data.chunks_exact(BLOCK_SIZE);
        for chunk in chunks.by_ref() {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            self.update_block(y, &block);
        }

        let rest = chunks.remainder();
        if !rest.is_empty() {
            let mut block = [0u8; BLOCK_SIZE];
            block[..rest.len()].copy_from_slice(rest);
            self.update_block(y, &block);
        }
    }

    fn update_block(&self, y: &mut FieldElement, block: &Block) {
        *y = self.table.mul(y.xor(FieldElement::from_block(block)));
    }

    /// Returns GHASH over `data` zero padded to a whole number of blocks.
    pub fn hash_padded(&self, data: &[u8]) -> Block {
        let mut y = FieldElement::default();
        self.update(&mut y, data);
        y.to_block()
    }

    /// Returns `GHASH(A || C || len(A) || len(C))`, the value masked with
    /// `E_k(J0)` to produce a GCM tag.
    pub fn authenticate(&self, aad: &[u8], ciphertext: &[u8]) -> Block {
        let mut y = FieldElement::default();
        self.update(&mut y, aad);
        self.update(&mut y, ciphertext);

        y.low ^= (aad.len() as u64) * 8;
        y.high ^= (ciphertext.len() as u64) * 8;
        y = self.table.mul(y);

        y.to_block()
    }

    /// Derives the pre-counter block J0 from `nonce`.
    ///
    /// A 96-bit nonce is used directly with a counter of 1, any other length
    /// is hashed together with its bit length.
    pub fn derive_j0(&self, nonce: &[u8]) -> Block {
        if nonce.len() == crate::NONCE_SIZE {
            let mut j0 = [0u8; BLOCK_SIZE];
            j0[..crate::NONCE_SIZE].copy_from_slice(nonce);
            j0[BLOCK_SIZE - 1] = 1;
            return j0;
        }

        let mut y = FieldElement::default();
        self.update(&mut y, nonce);
        y.high ^= (nonce.len() as u64) * 8;
        self.table.mul(y).to_block()
    }
}
