use crate::{tag::tags_equal, Aes, Block, GHash, GcmError, BLOCK_SIZE, TAG_SIZE};

/// AES-GCM keyed with a fixed key.
#[derive(Debug, Clone)]
pub struct AesGcm {
    cipher: Aes,
    ghash: GHash,
    ecb0: Block,
}

impl AesGcm {
    /// Creates a new instance from a 16, 24 or 32 byte key.
    pub fn new(key: &[u8]) -> Result<Self, GcmError> {
        let cipher = Aes::new(key)?;
        let ecb0 = cipher.encrypt_block(&[0u8; BLOCK_SIZE]);

        Ok(Self {
            ghash: GHash::new(&ecb0),
            cipher,
            ecb0,
        })
    }

    /// Returns `E_k(0^128)`, the GHASH key.
    pub fn ecb0(&self) -> Block {
        self.ecb0
    }

    /// Returns `E_k(J0)` for `nonce`, the mask applied to the GHASH output.
    pub fn tag_mask(&self, nonce: &[u8]) -> Result<Block, GcmError> {
        check_nonce(nonce)?;
        Ok(self.cipher.encrypt_block(&self.ghash.derive_j0(nonce)))
    }

    /// Encrypts `plaintext` and returns the ciphertext with the tag appended.
    pub fn seal(&self, nonce: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, GcmError> {
        check_nonce(nonce)?;

        let mut counter = self.ghash.derive_j0(nonce);
        let tag_mask = self.cipher.encrypt_block(&counter);
        inc32(&mut counter);

        let mut out = plaintext.to_vec();
        self.apply_keystream(&mut counter, &mut out);

        let tag = self.tag(aad, &out, &tag_mask);
        out.extend_from_slice(&tag);

        Ok(out)
    }

    /// Verifies the tag and decrypts `ciphertext`, which must carry the tag
    /// as its last 16 bytes.
    ///
    /// No plaintext is returned unless the tag matches.
    pub fn open(&self, nonce: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, GcmError> {
        check_nonce(nonce)?;
        if ciphertext.len() < TAG_SIZE {
            return Err(GcmError::CiphertextTooShort {
                len: ciphertext.len(),
                min: TAG_SIZE,
            });
        }

        let (ciphertext, tag) = ciphertext.split_at(ciphertext.len() - TAG_SIZE);

        let mut counter = self.ghash.derive_j0(nonce);
        let tag_mask = self.cipher.encrypt_block(&counter);
        inc32(&mut counter);

        let expected = self.tag(aad, ciphertext, &tag_mask);
        if !tags_equal(&expected, tag) {
            return Err(GcmError::AuthenticationFailed);
        }

        let mut out = ciphertext.to_vec();
        self.apply_keystream(&mut counter, &mut out);

        Ok(out)
    }

    fn tag(&self, aad: &[u8], ciphertext: &[u8], tag_mask: &Block) -> Block {
        let mut tag = self.ghash.authenticate(aad, ciphertext);
        tag.iter_mut().zip(tag_mask).for_each(|(t, m)| *t ^= m);
        tag
    }

    fn apply_keystream(&self, counter: &mut Block, data: &mut [u8]) {
        for chunk in data.chunks_mut(BLOCK_SIZE) {
            let keystream = self.cipher.encrypt_block(counter);
            inc32(counter);
            chunk.iter_mut().zip(keystream).for_each(|(d, k)| *d ^= k);
        }
    }
}

fn check_nonce(nonce: &[u8]) -> Result<(), GcmError> {
    if nonce.is_empty() {
        return Err(GcmError::EmptyNonce);
    }
    Ok(())
}

/// Increments the low 32 bits of the counter block, wrapping.
fn inc32(counter: &mut Block) {
    let mut ctr = [0u8; 4];
    ctr.copy_from_slice(&counter[12..]);
    let ctr = u32::from_be_bytes(ctr).wrapping_add(1);
    counter[12..].copy_from_slice(&ctr.to_be_bytes());
}
