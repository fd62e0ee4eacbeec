use crate::{Block, GcmError};

/// Forward S-box, generated at compile time.
static SBOX: [u8; 256] = build_sbox();

/// Round constants for key expansion.
const RCON: [u8; 10] = [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80, 0x1b, 0x36];

const fn build_sbox() -> [u8; 256] {
    let mut sbox = [0u8; 256];
    let mut p: u8 = 1;
    let mut q: u8 = 1;

    // p walks the multiplicative group by powers of 3, q tracks its inverse.
    loop {
        p = p ^ (p << 1) ^ if p & 0x80 != 0 { 0x1b } else { 0 };

        q ^= q << 1;
        q ^= q << 2;
        q ^= q << 4;
        if q & 0x80 != 0 {
            q ^= 0x09;
        }

        let x = q
            ^ q.rotate_left(1)
            ^ q.rotate_left(2)
            ^ q.rotate_left(3)
            ^ q.rotate_left(4);
        sbox[p as usize] = x ^ 0x63;

        if p == 1 {
            break;
        }
    }

    // Zero has no inverse.
    sbox[0] = 0x63;
    sbox
}

#[inline]
fn xtime(x: u8) -> u8 {
    (x << 1) ^ if x & 0x80 != 0 { 0x1b } else { 0 }
}

/// AES block cipher, encryption direction only.
///
/// GCM only ever runs the forward cipher, so no decryption schedule is kept.
#[derive(Clone)]
pub struct Aes {
    round_keys: Vec<Block>,
}

impl std::fmt::Debug for Aes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aes")
            .field("rounds", &(self.round_keys.len() - 1))
            .finish_non_exhaustive()
    }
}

impl Aes {
    /// Expands `key`, which must be 16, 24 or 32 bytes long.
    pub fn new(key: &[u8]) -> Result<Self, GcmError> {
        let nk = match key.len() {
            16 => 4,
            24 => 6,
            32 => 8,
            len => return Err(GcmError::InvalidKeyLength(len)),
        };
        let rounds = nk + 6;
        let total_words = 4 * (rounds + 1);

        let mut words: Vec<[u8; 4]> = Vec::with_capacity(total_words);
        words.extend(key.chunks_exact(4).map(|c| [c[0], c[1], c[2], c[3]]));

        for i in nk..total_words {
            let mut temp = words[i - 1];
            if i % nk == 0 {
                temp.rotate_left(1);
                temp = sub_word(temp);
                temp[0] ^= RCON[i / nk - 1];
            } else if nk > 6 && i % nk == 4 {
                temp = sub_word(temp);
            }

            let prev = words[i - nk];
            words.push([
                prev[0] ^ temp[0],
                prev[1] ^ temp[1],
                prev[2] ^ temp[2],
                prev[3] ^ temp[3],
            ]);
        }

        let round_keys = words
            .chunks_exact(4)
            .map(|round| {
                let mut key = [0u8; 16];
                for (dst, word) in key.chunks_exact_mut(4).zip(round) {
                    dst.copy_from_slice(word);
                }
                key
            })
            .collect();

        Ok(Self { round_keys })
    }

    /// Encrypts a single block.
    pub fn encrypt_block(&self, block: &Block) -> Block {
        let mut state = *block;
        let last = self.round_keys.len() - 1;

        add_round_key(&mut state, &self.round_keys[0]);
        for round_key in &self.round_keys[1..last] {
            sub_bytes(&mut state);
            shift_rows(&mut state);
            mix_columns(&mut state);
            add_round_key(&mut state, round_key);
        }
        sub_bytes(&mut state);
        shift_rows(&mut state);
        add_round_key(&mut state, &self.round_keys[last]);

        state
    }
}

fn sub_word(word: [u8; 4]) -> [u8; 4] {
    word.map(|b| SBOX[b as usize])
}

fn add_round_key(state: &mut Block, round_key: &Block) {
    state.iter_mut().zip(round_key).for_each(|(s, k)| *s ^= k);
}

fn sub_bytes(state: &mut Block) {
    state.iter_mut().for_each(|b| *b = SBOX[*b as usize]);
}

// State is column major: byte `r + 4c` is row `r` of column `c`.
fn shift_rows(state: &mut Block) {
    let old = *state;
    for c in 0..4 {
        for r in 1..4 {
            state[r + 4 * c] = old[r + 4 * ((c + r) % 4)];
        }
    }
}

fn mix_columns(state: &mut Block) {
    for column in state.chunks_exact_mut(4) {
        let [a0, a1, a2, a3] = [column[0], column[1], column[2], column[3]];
        let all = a0 ^ a1 ^ a2 ^ a3;
        column[0] = a0 ^ all ^ xtime(a0 ^ a1);
        column[1] = a1 ^ all ^ xtime(a1 ^ a2);
        column[2] = a2 ^ all ^ xtime(a2 ^ a3);
        column[3] = a3 ^ all ^ xtime(a3 ^ a0);
    }
}
