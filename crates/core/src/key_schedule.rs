//! TLS 1.3 key schedule with the HMAC first block digests and inner hashes
//! exposed.
//!
//! Every HKDF step of the schedule is an HMAC keyed with a secret. Disclosing
//! the digest of the first (`key xor ipad`) block of such an HMAC lets a
//! verifier compute the inner hash of the step, which a circuit then takes as
//! a public input, without learning the secret itself.

use hmac_sha256::{
    first_block_digest, hkdf_expand_input, hkdf_expand_label, hkdf_extract, hmac_continue,
    hmac_sha256, Digest, HmacPad,
};
use tls_core::cipher::{CipherState, IV_LEN, KEY_LEN};

use crate::{transcript::Checkpoints, Error};

pub(crate) const SERVER_HS_TRAFFIC: &[u8] = b"s hs traffic";
pub(crate) const CLIENT_HS_TRAFFIC: &[u8] = b"c hs traffic";
pub(crate) const SERVER_AP_TRAFFIC: &[u8] = b"s ap traffic";
pub(crate) const CLIENT_AP_TRAFFIC: &[u8] = b"c ap traffic";
pub(crate) const DERIVED: &[u8] = b"derived";
pub(crate) const FINISHED: &[u8] = b"finished";

/// Inner hash of the HKDF-Expand step `label`/`ctx` from the `ipad` first
/// block digest of its secret.
pub fn expand_inner_hash(
    first_block: &[u8],
    label: &[u8],
    ctx: &[u8],
    out_len: u16,
) -> Result<Digest, Error> {
    Ok(hmac_continue(
        &hkdf_expand_input(label, ctx, out_len),
        first_block,
    )?)
}

/// `ipad` first block digests of the secrets in the schedule, the digests
/// that may be disclosed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstBlocks {
    /// `ipad` of the handshake secret.
    pub hs_ipad: Digest,
    /// `ipad` of the derived handshake secret.
    pub dhs_ipad: Digest,
    /// `ipad` of the master secret.
    pub ms_ipad: Digest,
    /// `ipad` of the server handshake traffic secret.
    pub shts_ipad: Digest,
    /// `ipad` of the server finished key.
    pub fk_ipad: Digest,
    /// `ipad` of the server application traffic secret.
    pub sats_ipad: Digest,
    /// `ipad` of the client application traffic secret.
    pub cats_ipad: Digest,
}

/// Inner hashes of the schedule steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerHashes {
    /// Server handshake traffic secret.
    pub shts: Digest,
    /// Server finished key.
    pub kfs: Digest,
    /// Server Finished verify data.
    pub sf: Digest,
    /// Derived handshake secret.
    pub dhs: Digest,
    /// Master secret.
    pub ms: Digest,
    /// Server application traffic secret.
    pub sats: Digest,
    /// Client application traffic secret.
    pub cats: Digest,
    /// Server application key.
    pub ksapp_key: Digest,
    /// Server application IV.
    pub ksapp_iv: Digest,
    /// Client application key.
    pub kcapp_key: Digest,
    /// Client application IV.
    pub kcapp_iv: Digest,
}

/// The key schedule of a session from the handshake secret onwards.
///
/// No PSK is used, so the early secret is fixed.
#[derive(Clone)]
pub struct KeySchedule {
    /// Early secret.
    pub early_secret: Digest,
    /// Derived early secret, the salt of the handshake secret.
    pub derived_early_secret: Digest,
    /// Handshake secret.
    pub handshake_secret: Digest,
    /// Client handshake traffic secret.
    pub client_handshake_traffic_secret: Digest,
    /// Server handshake traffic secret.
    pub server_handshake_traffic_secret: Digest,
    /// Server handshake traffic key.
    pub server_handshake_key: [u8; KEY_LEN],
    /// Server handshake traffic IV.
    pub server_handshake_iv: [u8; IV_LEN],
    /// Derived handshake secret, the salt of the master secret.
    pub derived_handshake_secret: Digest,
    /// Master secret.
    pub master_secret: Digest,
    /// Server finished key.
    pub server_finished_key: Digest,
    /// Expected server Finished verify data.
    pub server_finished: Digest,
    /// Client application traffic secret.
    pub client_application_traffic_secret: Digest,
    /// Server application traffic secret.
    pub server_application_traffic_secret: Digest,
    /// Server application key.
    pub server_application_key: [u8; KEY_LEN],
    /// Server application IV.
    pub server_application_iv: [u8; IV_LEN],
    /// Client application key.
    pub client_application_key: [u8; KEY_LEN],
    /// Client application IV.
    pub client_application_iv: [u8; IV_LEN],
    /// `opad` first block digest of the handshake secret.
    pub hs_opad: Digest,
    /// `opad` first block digest of the server handshake traffic secret.
    pub shts_opad: Digest,
    /// `ipad` first block digests.
    pub first_blocks: FirstBlocks,
    /// Inner hashes.
    pub inner_hashes: InnerHashes,
}

impl std::fmt::Debug for KeySchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySchedule").finish_non_exhaustive()
    }
}

impl KeySchedule {
    /// Derives the schedule from the handshake secret and the transcript
    /// checkpoints.
    pub fn derive(handshake_secret: &[u8], checkpoints: &Checkpoints) -> Result<Self, Error> {
        let handshake_secret: Digest = handshake_secret.try_into().map_err(|_| {
            Error::encoding().with_msg(format!(
                "handshake secret must be 32 bytes, got {}",
                handshake_secret.len()
            ))
        })?;
        let zeros = [0u8; 32];

        let early_secret = hkdf_extract(&zeros, &zeros)?;
        let derived_early_secret = expand(&early_secret, DERIVED, &checkpoints.h0)?;

        let client_handshake_traffic_secret =
            expand(&handshake_secret, CLIENT_HS_TRAFFIC, &checkpoints.h2)?;
        let server_handshake_traffic_secret =
            expand(&handshake_secret, SERVER_HS_TRAFFIC, &checkpoints.h2)?;
        let (server_handshake_key, server_handshake_iv) =
            traffic_key_iv(&server_handshake_traffic_secret)?;

        let derived_handshake_secret = expand(&handshake_secret, DERIVED, &checkpoints.h0)?;
        let master_secret = hkdf_extract(&derived_handshake_secret, &zeros)?;

        let server_finished_key = expand(&server_handshake_traffic_secret, FINISHED, &[])?;
        let server_finished = hmac_sha256(&server_finished_key, &checkpoints.h7)?;

        let client_application_traffic_secret =
            expand(&master_secret, CLIENT_AP_TRAFFIC, &checkpoints.h3)?;
        let server_application_traffic_secret =
            expand(&master_secret, SERVER_AP_TRAFFIC, &checkpoints.h3)?;
        let (server_application_key, server_application_iv) =
            traffic_key_iv(&server_application_traffic_secret)?;
        let (client_application_key, client_application_iv) =
            traffic_key_iv(&client_application_traffic_secret)?;

        let first_blocks = FirstBlocks {
            hs_ipad: first_block_digest(&handshake_secret, HmacPad::Inner)?,
            dhs_ipad: first_block_digest(&derived_handshake_secret, HmacPad::Inner)?,
            ms_ipad: first_block_digest(&master_secret, HmacPad::Inner)?,
            shts_ipad: first_block_digest(&server_handshake_traffic_secret, HmacPad::Inner)?,
            fk_ipad: first_block_digest(&server_finished_key, HmacPad::Inner)?,
            sats_ipad: first_block_digest(&server_application_traffic_secret, HmacPad::Inner)?,
            cats_ipad: first_block_digest(&client_application_traffic_secret, HmacPad::Inner)?,
        };
        let inner_hashes = InnerHashes::compute(&first_blocks, checkpoints)?;

        Ok(Self {
            early_secret,
            derived_early_secret,
            handshake_secret,
            client_handshake_traffic_secret,
            server_handshake_traffic_secret,
            server_handshake_key,
            server_handshake_iv,
            derived_handshake_secret,
            master_secret,
            server_finished_key,
            server_finished,
            client_application_traffic_secret,
            server_application_traffic_secret,
            server_application_key,
            server_application_iv,
            client_application_key,
            client_application_iv,
            hs_opad: first_block_digest(&handshake_secret, HmacPad::Outer)?,
            shts_opad: first_block_digest(&server_handshake_traffic_secret, HmacPad::Outer)?,
            first_blocks,
            inner_hashes,
        })
    }

    /// Returns the server handshake traffic cipher state.
    pub fn server_handshake_keys(&self) -> Result<CipherState, Error> {
        Ok(CipherState::new(
            self.server_handshake_key,
            self.server_handshake_iv,
        )?)
    }

    /// Returns the client handshake traffic cipher state.
    pub fn client_handshake_keys(&self) -> Result<CipherState, Error> {
        Ok(CipherState::from_traffic_secret(
            &self.client_handshake_traffic_secret,
        )?)
    }

    /// Returns the server application traffic cipher state.
    pub fn server_application_keys(&self) -> Result<CipherState, Error> {
        Ok(CipherState::new(
            self.server_application_key,
            self.server_application_iv,
        )?)
    }

    /// Returns the client application traffic cipher state.
    pub fn client_application_keys(&self) -> Result<CipherState, Error> {
        Ok(CipherState::new(
            self.client_application_key,
            self.client_application_iv,
        )?)
    }
}

impl InnerHashes {
    /// Computes the inner hashes from the first block digests.
    pub fn compute(first_blocks: &FirstBlocks, checkpoints: &Checkpoints) -> Result<Self, Error> {
        Ok(Self {
            shts: expand_inner_hash(&first_blocks.hs_ipad, SERVER_HS_TRAFFIC, &checkpoints.h2, 32)?,
            kfs: expand_inner_hash(&first_blocks.shts_ipad, FINISHED, &[], 32)?,
            sf: hmac_continue(&checkpoints.h7, &first_blocks.fk_ipad)?,
            dhs: expand_inner_hash(&first_blocks.hs_ipad, DERIVED, &checkpoints.h0, 32)?,
            ms: hmac_continue(&[0u8; 32], &first_blocks.dhs_ipad)?,
            sats: expand_inner_hash(&first_blocks.ms_ipad, SERVER_AP_TRAFFIC, &checkpoints.h3, 32)?,
            cats: expand_inner_hash(&first_blocks.ms_ipad, CLIENT_AP_TRAFFIC, &checkpoints.h3, 32)?,
            ksapp_key: expand_inner_hash(&first_blocks.sats_ipad, b"key", &[], KEY_LEN as u16)?,
            ksapp_iv: expand_inner_hash(&first_blocks.sats_ipad, b"iv", &[], IV_LEN as u16)?,
            kcapp_key: expand_inner_hash(&first_blocks.cats_ipad, b"key", &[], KEY_LEN as u16)?,
            kcapp_iv: expand_inner_hash(&first_blocks.cats_ipad, b"iv", &[], IV_LEN as u16)?,
        })
    }
}

fn expand(secret: &[u8], label: &[u8], ctx: &[u8]) -> Result<Digest, Error> {
    let mut out = [0u8; 32];
    out.copy_from_slice(&hkdf_expand_label(secret, label, ctx, 32)?);
    Ok(out)
}

fn traffic_key_iv(secret: &[u8]) -> Result<([u8; KEY_LEN], [u8; IV_LEN]), Error> {
    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    key.copy_from_slice(&hkdf_expand_label(secret, b"key", &[], KEY_LEN)?);
    iv.copy_from_slice(&hkdf_expand_label(secret, b"iv", &[], IV_LEN)?);
    Ok((key, iv))
}
