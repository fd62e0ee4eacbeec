//! Record protection for `TLS_AES_128_GCM_SHA256`.
//!
//! Cipher state is threaded through [`decrypt_next_record`] by value: an
//! [`Epoch`] goes in with a record and the successor epoch comes back with
//! the plaintext.

use gcm::{AesGcm, TAG_SIZE};
use hmac_sha256::hkdf_expand_label;

#[cfg(feature = "logging")]
use crate::log::trace;
use crate::{
    msgs::enums::ContentType,
    record::{OpaqueRecord, PlainMessage, MAX_FRAGMENT_LEN},
    TlsError,
};

/// Traffic key length.
pub const KEY_LEN: usize = 16;
/// Traffic IV length.
pub const IV_LEN: usize = 12;

/// Key, IV and sequence number of one direction in one epoch.
#[derive(Clone)]
pub struct CipherState {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
    seq: u64,
    aead: AesGcm,
}

impl std::fmt::Debug for CipherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherState")
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl CipherState {
    /// Creates a state at sequence number zero.
    pub fn new(key: [u8; KEY_LEN], iv: [u8; IV_LEN]) -> Result<Self, TlsError> {
        Ok(Self {
            aead: AesGcm::new(&key)?,
            key,
            iv,
            seq: 0,
        })
    }

    /// Derives the traffic key and IV from a traffic secret.
    pub fn from_traffic_secret(secret: &[u8]) -> Result<Self, TlsError> {
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&hkdf_expand_label(secret, b"key", b"", KEY_LEN)?);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&hkdf_expand_label(secret, b"iv", b"", IV_LEN)?);

        Self::new(key, iv)
    }

    /// Returns the traffic key.
    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// Returns the traffic IV.
    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    /// Returns the sequence number of the next record.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Returns the keyed AEAD.
    pub fn aead(&self) -> &AesGcm {
        &self.aead
    }

    /// Returns the per-record nonce for `seq`.
    pub fn nonce(&self, seq: u64) -> [u8; IV_LEN] {
        let mut nonce = self.iv;
        nonce[IV_LEN - 8..]
            .iter_mut()
            .zip(seq.to_be_bytes())
            .for_each(|(n, s)| *n ^= s);
        nonce
    }

    fn advance(mut self) -> Result<Self, TlsError> {
        self.seq = self.seq.checked_add(1).ok_or(TlsError::SequenceWrap)?;
        Ok(self)
    }
}

/// Protection state of one direction.
#[derive(Debug, Clone)]
pub enum Epoch {
    /// Records are not protected.
    Plaintext,
    /// Records are protected with the given state.
    Protected(CipherState),
}

impl Epoch {
    /// Returns the cipher state if the epoch is protected.
    pub fn cipher_state(&self) -> Option<&CipherState> {
        match self {
            Epoch::Plaintext => None,
            Epoch::Protected(state) => Some(state),
        }
    }
}

/// Decrypts `record` under `epoch`, returning the successor epoch and the
/// plaintext with its inner content type.
///
/// Under [`Epoch::Plaintext`] the record is passed through unchanged.
pub fn decrypt_next_record(
    epoch: Epoch,
    record: &OpaqueRecord,
) -> Result<(Epoch, PlainMessage), TlsError> {
    let state = match epoch {
        Epoch::Plaintext => {
            return Ok((
                Epoch::Plaintext,
                PlainMessage {
                    typ: record.typ,
                    payload: record.payload.clone(),
                },
            ))
        }
        Epoch::Protected(state) => state,
    };

    if record.typ != ContentType::ApplicationData {
        return Err(TlsError::UnexpectedContent {
            expected: ContentType::ApplicationData,
            got: record.typ,
        });
    }
    if record.payload.len() <= TAG_SIZE {
        return Err(TlsError::framing(format!(
            "protected record of {} bytes is too short",
            record.payload.len()
        )));
    }

    let seq = state.seq;
    let mut plaintext = state
        .aead
        .open(&state.nonce(seq), &record.payload, &record.header())
        .map_err(|source| TlsError::Decrypt { seq, source })?;

    let typ = match plaintext.iter().rposition(|&b| b != 0) {
        Some(pos) => {
            let typ = ContentType::from(plaintext[pos]);
            plaintext.truncate(pos);
            typ
        }
        None => {
            return Err(TlsError::decode(format!(
                "record {seq} has no inner content type"
            )))
        }
    };
    if plaintext.len() > MAX_FRAGMENT_LEN {
        return Err(TlsError::framing(format!(
            "record {seq} plaintext exceeds {MAX_FRAGMENT_LEN} bytes"
        )));
    }

    trace!("decrypted record {} as {:?}, {} bytes", seq, typ, plaintext.len());

    Ok((
        Epoch::Protected(state.advance()?),
        PlainMessage {
            typ,
            payload: plaintext,
        },
    ))
}

/// Protects `payload` of inner type `typ` under `state`, returning the
/// successor state and the record.
pub fn encrypt_record(
    state: CipherState,
    typ: ContentType,
    payload: &[u8],
) -> Result<(CipherState, OpaqueRecord), TlsError> {
    let mut inner = Vec::with_capacity(payload.len() + 1);
    inner.extend_from_slice(payload);
    inner.push(typ.get_u8());

    let header_len = (inner.len() + TAG_SIZE) as u16;
    let mut aad = [ContentType::ApplicationData.get_u8(), 0x03, 0x03, 0, 0];
    aad[3..].copy_from_slice(&header_len.to_be_bytes());

    let ciphertext = state.aead.seal(&state.nonce(state.seq), &inner, &aad)?;

    Ok((
        state.advance()?,
        OpaqueRecord::new(ContentType::ApplicationData, ciphertext),
    ))
}
