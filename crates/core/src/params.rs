//! Key schedule values the prover discloses to the verifier.

use std::{collections::BTreeMap, path::Path};

use serde_json::Value;
use sha2::{Digest, Sha256};
use tls_core::cipher::CipherState;
use tracing::warn;

use crate::{key_schedule::KeySchedule, storage, Error};

const SHTS: &str = "SHTS";
const SHTS_IN: &str = "SHTSin";
const HS_OPAD: &str = "intermediateHashHSopad";
const DHS_IPAD: &str = "intermediateHashdHSipad";
const CATS_IPAD: &str = "intermediateHashCATSipad";
const MS_IPAD: &str = "intermediateHashMSipad";
const SATS_IPAD: &str = "intermediateHashSATSipad";
const HASH_KEY_CAPP: &str = "hashKeyCapp";
const HASH_IV_CAPP: &str = "hashIvCapp";
const HASH_KEY_SAPP: &str = "hashKeySapp";
const HASH_IV_SAPP: &str = "hashIvSapp";

/// Contents of the TLS parameters file.
///
/// Loading is lenient: a missing or malformed field decodes to an empty value
/// and is only rejected where it is used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsParameters {
    /// Server handshake traffic secret.
    pub shts: Vec<u8>,
    /// Inner hash of the server handshake traffic secret.
    pub shts_in: Vec<u8>,
    /// `opad` first block digest of the handshake secret.
    pub hs_opad: Vec<u8>,
    /// `ipad` first block digest of the derived handshake secret.
    pub dhs_ipad: Vec<u8>,
    /// `ipad` first block digest of the client application traffic secret.
    pub cats_ipad: Vec<u8>,
    /// `ipad` first block digest of the master secret.
    pub ms_ipad: Vec<u8>,
    /// `ipad` first block digest of the server application traffic secret.
    pub sats_ipad: Vec<u8>,
    /// SHA-256 of the client application key.
    pub hash_key_capp: Vec<u8>,
    /// SHA-256 of the client application IV.
    pub hash_iv_capp: Vec<u8>,
    /// SHA-256 of the server application key.
    pub hash_key_sapp: Vec<u8>,
    /// SHA-256 of the server application IV.
    pub hash_iv_sapp: Vec<u8>,
}

impl TlsParameters {
    /// Collects the disclosed values from a key schedule.
    pub fn from_schedule(schedule: &KeySchedule) -> Self {
        let hash = |data: &[u8]| Sha256::digest(data).to_vec();

        Self {
            shts: schedule.server_handshake_traffic_secret.to_vec(),
            shts_in: schedule.inner_hashes.shts.to_vec(),
            hs_opad: schedule.hs_opad.to_vec(),
            dhs_ipad: schedule.first_blocks.dhs_ipad.to_vec(),
            cats_ipad: schedule.first_blocks.cats_ipad.to_vec(),
            ms_ipad: schedule.first_blocks.ms_ipad.to_vec(),
            sats_ipad: schedule.first_blocks.sats_ipad.to_vec(),
            hash_key_capp: hash(&schedule.client_application_key),
            hash_iv_capp: hash(&schedule.client_application_iv),
            hash_key_sapp: hash(&schedule.server_application_key),
            hash_iv_sapp: hash(&schedule.server_application_iv),
        }
    }

    /// Parses the parameters from JSON.
    ///
    /// The document must be a JSON object, its fields are decoded leniently.
    pub fn from_json(json: &[u8]) -> Result<Self, Error> {
        let map: BTreeMap<String, Value> = serde_json::from_slice(json).map_err(|e| {
            Error::encoding()
                .with_msg("tls parameters must be a json object")
                .with_source(e)
        })?;

        let field = |name: &str| -> Vec<u8> {
            match map.get(name) {
                Some(Value::String(value)) => hex::decode(value).unwrap_or_else(|_| {
                    warn!("tls parameter {} is not valid hex", name);
                    Vec::new()
                }),
                Some(_) => {
                    warn!("tls parameter {} is not a string", name);
                    Vec::new()
                }
                None => Vec::new(),
            }
        };

        Ok(Self {
            shts: field(SHTS),
            shts_in: field(SHTS_IN),
            hs_opad: field(HS_OPAD),
            dhs_ipad: field(DHS_IPAD),
            cats_ipad: field(CATS_IPAD),
            ms_ipad: field(MS_IPAD),
            sats_ipad: field(SATS_IPAD),
            hash_key_capp: field(HASH_KEY_CAPP),
            hash_iv_capp: field(HASH_IV_CAPP),
            hash_key_sapp: field(HASH_KEY_SAPP),
            hash_iv_sapp: field(HASH_IV_SAPP),
        })
    }

    /// Reads the parameters file at `path`.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let json = std::fs::read(path).map_err(|e| {
            Error::io()
                .with_msg(format!("failed to read tls parameters {}", path.display()))
                .with_source(e)
        })?;
        Self::from_json(&json)
    }

    /// Returns the hex encoded fields by their file names.
    pub fn to_map(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            (SHTS, hex::encode(&self.shts)),
            (SHTS_IN, hex::encode(&self.shts_in)),
            (HS_OPAD, hex::encode(&self.hs_opad)),
            (DHS_IPAD, hex::encode(&self.dhs_ipad)),
            (CATS_IPAD, hex::encode(&self.cats_ipad)),
            (MS_IPAD, hex::encode(&self.ms_ipad)),
            (SATS_IPAD, hex::encode(&self.sats_ipad)),
            (HASH_KEY_CAPP, hex::encode(&self.hash_key_capp)),
            (HASH_IV_CAPP, hex::encode(&self.hash_iv_capp)),
            (HASH_KEY_SAPP, hex::encode(&self.hash_key_sapp)),
            (HASH_IV_SAPP, hex::encode(&self.hash_iv_sapp)),
        ])
    }

    /// Writes the parameters file to `path`.
    pub fn store(&self, path: &Path) -> Result<(), Error> {
        storage::write_json(path, &self.to_map())
    }

    /// Derives the server handshake traffic keys from the disclosed SHTS.
    pub fn server_handshake_keys(&self) -> Result<CipherState, Error> {
        if self.shts.len() != 32 {
            return Err(Error::encoding().with_msg(format!(
                "{SHTS} must be 32 bytes, got {}",
                self.shts.len()
            )));
        }
        Ok(CipherState::from_traffic_secret(&self.shts)?)
    }
}
