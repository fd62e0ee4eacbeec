//! Policy extracts, the evidence a prover keeps and the part it discloses.
//!
//! Field names and hex encodings are the interface to the circuit backend.

use std::path::Path;

use gcm::Block;
use serde::{Deserialize, Serialize};
use tls_core::{cipher::CipherState, record::OpaqueRecord};

use crate::{
    key_schedule::{FirstBlocks, KeySchedule},
    policy::{CompiledPolicy, Location},
    storage, Error,
};

/// GCM ingredients and the block range of the record holding a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEvidence {
    /// Sequence number of the record in the application epoch.
    pub seq: u64,
    /// `E_k(0^128)`.
    pub galois_key_cipher: Block,
    /// `E_k(nonce || 0^31 || 1)`.
    pub task_mask_cipher: Block,
    /// Inner plaintext of the blocks holding the match.
    pub plaintext_to_proof: Vec<u8>,
    /// Ciphertext of the same blocks.
    pub ciphertext_to_proof: Vec<u8>,
}

impl RecordEvidence {
    /// Prepares the evidence for `location` in `record`, protected with
    /// `keys` under sequence number `seq`.
    ///
    /// The block range is cut from the full inner plaintext, so it may cover
    /// the content type byte and padding of the record.
    pub fn prepare(
        keys: &CipherState,
        seq: u64,
        record: &OpaqueRecord,
        location: &Location,
    ) -> Result<Self, Error> {
        let nonce = keys.nonce(seq);
        let inner = keys
            .aead()
            .open(&nonce, &record.payload, &record.header())
            .map_err(|e| {
                Error::authentication()
                    .with_msg(format!("record {seq} failed to decrypt"))
                    .with_source(e)
            })?;

        let range = location.block_range();
        let end = range.end.min(inner.len());
        if range.start >= end {
            return Err(Error::framing().with_msg(format!(
                "block range {range:?} is outside record {seq}"
            )));
        }

        Ok(Self {
            seq,
            galois_key_cipher: keys.aead().ecb0(),
            task_mask_cipher: keys.aead().tag_mask(&nonce)?,
            plaintext_to_proof: inner[range.start..end].to_vec(),
            ciphertext_to_proof: record.payload[range.start..end].to_vec(),
        })
    }
}

/// Returns the sequence number as 8 big-endian bytes in hex.
pub fn seq_hex(seq: u64) -> String {
    hex::encode(seq.to_be_bytes())
}

/// The policy extract kept by the prover.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyExtract {
    #[serde(rename = "StartBlockIdx")]
    pub start_block_idx: usize,
    #[serde(rename = "EndBlockIdx")]
    pub end_block_idx: usize,
    #[serde(rename = "KeyValuePatternLength")]
    pub key_value_pattern_length: usize,
    #[serde(rename = "OffsetKeyValuePatternStart")]
    pub offset_key_value_pattern_start: usize,
    #[serde(rename = "OffsetValueStart")]
    pub offset_value_start: usize,
    #[serde(rename = "ValueLength")]
    pub value_length: usize,
    #[serde(rename = "DotPosition")]
    pub dot_position: usize,
    #[serde(rename = "Threshold")]
    pub threshold: String,
    #[serde(rename = "CompareMaxBitLen")]
    pub compare_max_bit_len: usize,
    #[serde(rename = "KeyValuePair")]
    pub key_value_pair: String,
    #[serde(rename = "KeyValueStartPattern")]
    pub key_value_start_pattern: String,
    #[serde(rename = "Seq")]
    pub seq: String,

    #[serde(rename = "EarlySecret")]
    pub early_secret: String,
    #[serde(rename = "DerivedEarlySecret")]
    pub derived_early_secret: String,
    #[serde(rename = "HandshakeSecret")]
    pub handshake_secret: String,
    #[serde(rename = "ClientHandshakeTrafficSecret")]
    pub client_handshake_traffic_secret: String,
    #[serde(rename = "ServerHandshakeTrafficSecret")]
    pub server_handshake_traffic_secret: String,
    #[serde(rename = "ServerHandshakeTrafficKey")]
    pub server_handshake_traffic_key: String,
    #[serde(rename = "ServerHandshakeTrafficIV")]
    pub server_handshake_traffic_iv: String,
    #[serde(rename = "HkdfSHTSFirstBlock")]
    pub hkdf_shts_first_block: String,
    #[serde(rename = "HkdfDHSFirstBlock")]
    pub hkdf_dhs_first_block: String,
    #[serde(rename = "DerivedHandshakeSecret")]
    pub derived_handshake_secret: String,
    #[serde(rename = "MasterSecret")]
    pub master_secret: String,
    #[serde(rename = "HkdfMSFirstBlock")]
    pub hkdf_ms_first_block: String,
    #[serde(rename = "HkdfKFSFirstBlock")]
    pub hkdf_kfs_first_block: String,
    #[serde(rename = "HkdfKFS")]
    pub hkdf_kfs: String,
    #[serde(rename = "HkdfSFFirstBlock")]
    pub hkdf_sf_first_block: String,
    #[serde(rename = "HkdfSF")]
    pub hkdf_sf: String,
    #[serde(rename = "HkdfSATSFirstBlock")]
    pub hkdf_sats_first_block: String,
    #[serde(rename = "ClientAppTrafficSecret")]
    pub client_app_traffic_secret: String,
    #[serde(rename = "ServerAppTrafficSecret")]
    pub server_app_traffic_secret: String,
    #[serde(rename = "ServerApplicationTrafficKey")]
    pub server_application_traffic_key: String,
    #[serde(rename = "ServerApplicationTrafficIV")]
    pub server_application_traffic_iv: String,
    #[serde(rename = "HkdfKSAPPFirstBlock")]
    pub hkdf_ksapp_first_block: String,
    #[serde(rename = "ClientApplicationTrafficKey")]
    pub client_application_traffic_key: String,
    #[serde(rename = "ClientApplicationTrafficIV")]
    pub client_application_traffic_iv: String,
    #[serde(rename = "HkdfKCAPPFirstBlock")]
    pub hkdf_kcapp_first_block: String,
    #[serde(rename = "GaloisKeyCipher")]
    pub galois_key_cipher: String,
    #[serde(rename = "TaskMaskCipher")]
    pub task_mask_cipher: String,
    #[serde(rename = "PlaintextToProof")]
    pub plaintext_to_proof: String,

    #[serde(rename = "HkdfSHTSInnerHash")]
    pub hkdf_shts_inner_hash: String,
    #[serde(rename = "HkdfKFSInnerHash")]
    pub hkdf_kfs_inner_hash: String,
    #[serde(rename = "HkdfSFInnerHash")]
    pub hkdf_sf_inner_hash: String,
    #[serde(rename = "HkdfDHSInnerHash")]
    pub hkdf_dhs_inner_hash: String,
    #[serde(rename = "HkdfMSInnerHash")]
    pub hkdf_ms_inner_hash: String,
    #[serde(rename = "HkdfSATSInnerHash")]
    pub hkdf_sats_inner_hash: String,
    #[serde(rename = "HkdfCATSInnerHash")]
    pub hkdf_cats_inner_hash: String,
    #[serde(rename = "HkdfKSAPPKeyInnerHash")]
    pub hkdf_ksapp_key_inner_hash: String,
    #[serde(rename = "HkdfKSAPPIVInnerHash")]
    pub hkdf_ksapp_iv_inner_hash: String,
    #[serde(rename = "HkdfKCAPPKeyInnerHash")]
    pub hkdf_kcapp_key_inner_hash: String,
    #[serde(rename = "HkdfKCAPPIVInnerHash")]
    pub hkdf_kcapp_iv_inner_hash: String,
    #[serde(rename = "CiphertextToProof")]
    pub ciphertext_to_proof: String,
}

impl PolicyExtract {
    /// Assembles the extract of a located value.
    pub fn new(
        policy: &CompiledPolicy,
        location: &Location,
        plaintext: &[u8],
        evidence: &RecordEvidence,
        schedule: &KeySchedule,
    ) -> Self {
        let blocks = &schedule.first_blocks;
        let inner = &schedule.inner_hashes;

        Self {
            start_block_idx: location.start_block_idx(),
            end_block_idx: location.end_block_idx(),
            key_value_pattern_length: location.key_value_pattern_length(),
            offset_key_value_pattern_start: location.offset_key_value_pattern_start(),
            offset_value_start: location.offset_value_start(),
            value_length: location.value_length(),
            dot_position: location.dot_position,
            threshold: policy.threshold().to_string(),
            compare_max_bit_len: policy.compare_max_bit_len(),
            key_value_pair: hex::encode(location.key_value_pair(plaintext)),
            key_value_start_pattern: String::from_utf8_lossy(
                location.key_value_start_pattern(plaintext),
            )
            .into_owned(),
            seq: seq_hex(evidence.seq),

            early_secret: hex::encode(schedule.early_secret),
            derived_early_secret: hex::encode(schedule.derived_early_secret),
            handshake_secret: hex::encode(schedule.handshake_secret),
            client_handshake_traffic_secret: hex::encode(schedule.client_handshake_traffic_secret),
            server_handshake_traffic_secret: hex::encode(schedule.server_handshake_traffic_secret),
            server_handshake_traffic_key: hex::encode(schedule.server_handshake_key),
            server_handshake_traffic_iv: hex::encode(schedule.server_handshake_iv),
            hkdf_shts_first_block: hex::encode(blocks.hs_ipad),
            hkdf_dhs_first_block: hex::encode(blocks.hs_ipad),
            derived_handshake_secret: hex::encode(schedule.derived_handshake_secret),
            master_secret: hex::encode(schedule.master_secret),
            hkdf_ms_first_block: hex::encode(blocks.dhs_ipad),
            hkdf_kfs_first_block: hex::encode(blocks.shts_ipad),
            hkdf_kfs: hex::encode(schedule.server_finished_key),
            hkdf_sf_first_block: hex::encode(blocks.fk_ipad),
            hkdf_sf: hex::encode(schedule.server_finished),
            hkdf_sats_first_block: hex::encode(blocks.ms_ipad),
            client_app_traffic_secret: hex::encode(schedule.client_application_traffic_secret),
            server_app_traffic_secret: hex::encode(schedule.server_application_traffic_secret),
            server_application_traffic_key: hex::encode(schedule.server_application_key),
            server_application_traffic_iv: hex::encode(schedule.server_application_iv),
            hkdf_ksapp_first_block: hex::encode(blocks.sats_ipad),
            client_application_traffic_key: hex::encode(schedule.client_application_key),
            client_application_traffic_iv: hex::encode(schedule.client_application_iv),
            hkdf_kcapp_first_block: hex::encode(blocks.cats_ipad),
            galois_key_cipher: hex::encode(evidence.galois_key_cipher),
            task_mask_cipher: hex::encode(evidence.task_mask_cipher),
            plaintext_to_proof: hex::encode(&evidence.plaintext_to_proof),

            hkdf_shts_inner_hash: hex::encode(inner.shts),
            hkdf_kfs_inner_hash: hex::encode(inner.kfs),
            hkdf_sf_inner_hash: hex::encode(inner.sf),
            hkdf_dhs_inner_hash: hex::encode(inner.dhs),
            hkdf_ms_inner_hash: hex::encode(inner.ms),
            hkdf_sats_inner_hash: hex::encode(inner.sats),
            hkdf_cats_inner_hash: hex::encode(inner.cats),
            hkdf_ksapp_key_inner_hash: hex::encode(inner.ksapp_key),
            hkdf_ksapp_iv_inner_hash: hex::encode(inner.ksapp_iv),
            hkdf_kcapp_key_inner_hash: hex::encode(inner.kcapp_key),
            hkdf_kcapp_iv_inner_hash: hex::encode(inner.kcapp_iv),
            ciphertext_to_proof: hex::encode(&evidence.ciphertext_to_proof),
        }
    }

    /// Returns the part of the extract that is disclosed.
    pub fn shared(&self) -> SharedPolicyExtract {
        SharedPolicyExtract {
            start_block_idx: self.start_block_idx,
            end_block_idx: self.end_block_idx,
            key_value_pattern_length: self.key_value_pattern_length,
            offset_key_value_pattern_start: self.offset_key_value_pattern_start,
            offset_value_start: self.offset_value_start,
            value_length: self.value_length,
            dot_position: self.dot_position,
            key_value_start_pattern: self.key_value_start_pattern.clone(),
            seq: self.seq.clone(),
            server_handshake_traffic_key: self.server_handshake_traffic_key.clone(),
            server_handshake_traffic_iv: self.server_handshake_traffic_iv.clone(),
            hkdf_shts_first_block: self.hkdf_shts_first_block.clone(),
            hkdf_dhs_first_block: self.hkdf_dhs_first_block.clone(),
            hkdf_ms_first_block: self.hkdf_ms_first_block.clone(),
            hkdf_kfs_first_block: self.hkdf_kfs_first_block.clone(),
            hkdf_sf_first_block: self.hkdf_sf_first_block.clone(),
            hkdf_sats_first_block: self.hkdf_sats_first_block.clone(),
            hkdf_ksapp_first_block: self.hkdf_ksapp_first_block.clone(),
            hkdf_kcapp_first_block: self.hkdf_kcapp_first_block.clone(),
            galois_key_cipher: self.galois_key_cipher.clone(),
            task_mask_cipher: self.task_mask_cipher.clone(),
        }
    }

    /// Writes the extract to `path`.
    pub fn store(&self, path: &Path) -> Result<(), Error> {
        storage::write_json(path, self)
    }
}

/// The policy extract disclosed to the verifier.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedPolicyExtract {
    #[serde(rename = "StartBlockIdx")]
    pub start_block_idx: usize,
    #[serde(rename = "EndBlockIdx")]
    pub end_block_idx: usize,
    #[serde(rename = "KeyValuePatternLength")]
    pub key_value_pattern_length: usize,
    #[serde(rename = "OffsetKeyValuePatternStart")]
    pub offset_key_value_pattern_start: usize,
    #[serde(rename = "OffsetValueStart")]
    pub offset_value_start: usize,
    #[serde(rename = "ValueLength")]
    pub value_length: usize,
    #[serde(rename = "DotPosition")]
    pub dot_position: usize,
    #[serde(rename = "KeyValueStartPattern")]
    pub key_value_start_pattern: String,
    #[serde(rename = "Seq")]
    pub seq: String,
    #[serde(rename = "ServerHandshakeTrafficKey")]
    pub server_handshake_traffic_key: String,
    #[serde(rename = "ServerHandshakeTrafficIV")]
    pub server_handshake_traffic_iv: String,
    #[serde(rename = "HkdfSHTSFirstBlock")]
    pub hkdf_shts_first_block: String,
    #[serde(rename = "HkdfDHSFirstBlock")]
    pub hkdf_dhs_first_block: String,
    #[serde(rename = "HkdfMSFirstBlock")]
    pub hkdf_ms_first_block: String,
    #[serde(rename = "HkdfKFSFirstBlock")]
    pub hkdf_kfs_first_block: String,
    #[serde(rename = "HkdfSFFirstBlock")]
    pub hkdf_sf_first_block: String,
    #[serde(rename = "HkdfSATSFirstBlock")]
    pub hkdf_sats_first_block: String,
    #[serde(rename = "HkdfKSAPPFirstBlock")]
    pub hkdf_ksapp_first_block: String,
    #[serde(rename = "HkdfKCAPPFirstBlock")]
    pub hkdf_kcapp_first_block: String,
    #[serde(rename = "GaloisKeyCipher")]
    pub galois_key_cipher: String,
    #[serde(rename = "TaskMaskCipher")]
    pub task_mask_cipher: String,
}

impl SharedPolicyExtract {
    /// Reads a shared extract.
    pub fn load(path: &Path) -> Result<Self, Error> {
        storage::read_json(path)
    }

    /// Writes the extract to `path`.
    pub fn store(&self, path: &Path) -> Result<(), Error> {
        storage::write_json(path, self)
    }

    /// Parses the disclosed sequence number.
    pub fn seq(&self) -> Result<u64, Error> {
        Ok(u64::from_be_bytes(storage::decode_array("Seq", &self.seq)?))
    }

    /// Parses the disclosed first block digests.
    ///
    /// `HkdfSHTSFirstBlock` and `HkdfDHSFirstBlock` are both keyed by the
    /// handshake secret and must agree.
    pub fn first_blocks(&self) -> Result<FirstBlocks, Error> {
        if self.hkdf_shts_first_block != self.hkdf_dhs_first_block {
            return Err(Error::encoding()
                .with_msg("HkdfSHTSFirstBlock and HkdfDHSFirstBlock differ"));
        }

        Ok(FirstBlocks {
            hs_ipad: storage::decode_array("HkdfSHTSFirstBlock", &self.hkdf_shts_first_block)?,
            dhs_ipad: storage::decode_array("HkdfMSFirstBlock", &self.hkdf_ms_first_block)?,
            ms_ipad: storage::decode_array("HkdfSATSFirstBlock", &self.hkdf_sats_first_block)?,
            shts_ipad: storage::decode_array("HkdfKFSFirstBlock", &self.hkdf_kfs_first_block)?,
            fk_ipad: storage::decode_array("HkdfSFFirstBlock", &self.hkdf_sf_first_block)?,
            sats_ipad: storage::decode_array("HkdfKSAPPFirstBlock", &self.hkdf_ksapp_first_block)?,
            cats_ipad: storage::decode_array("HkdfKCAPPFirstBlock", &self.hkdf_kcapp_first_block)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        policy::{Api, Constraint, Policy, Proxy},
        transcript::Checkpoints,
    };
    use tls_core::{
        fixtures::{SessionFixture, RESPONSE},
        replay::decrypt_application_data,
        HandshakeReplay,
    };

    fn compiled() -> CompiledPolicy {
        Policy {
            apis: vec![Api {
                url: "https://api.example.com/v1/quote?symbol=ACME".into(),
                content_type: "application/json".into(),
                pattern: "\"stock_value\": \"[0-9]+.[0-9]+\",".into(),
                creds: false,
            }],
            constraints: vec![Constraint {
                value: "98.00".into(),
                constraint: "GT".into(),
            }],
            proxies: vec![Proxy {
                host: "localhost".into(),
                port: "8082".into(),
                mode: "signature".into(),
                pub_key: String::new(),
                algorithm: String::new(),
            }],
        }
        .compile()
        .unwrap()
    }

    #[test]
    fn test_extract_from_session() {
        let fixture = SessionFixture::new();
        let keys =
            CipherState::from_traffic_secret(&fixture.secrets.server_handshake_traffic_secret)
                .unwrap();
        let handshake = HandshakeReplay::new(&fixture.client_capture, &fixture.server_capture)
            .unwrap()
            .finish(keys, None)
            .unwrap();
        let schedule = KeySchedule::derive(
            &fixture.secrets.handshake_secret,
            &Checkpoints::from_handshake(&handshake),
        )
        .unwrap();
        let app_keys = schedule.server_application_keys().unwrap();
        let records =
            decrypt_application_data(&handshake.server_records, app_keys.clone()).unwrap();

        let policy = compiled();
        let body = &records[1];
        assert_eq!(body.plaintext, RESPONSE[1]);
        let location = policy.locate(&body.plaintext).unwrap();

        let evidence =
            RecordEvidence::prepare(&app_keys, body.seq, &body.record, &location).unwrap();
        assert_eq!(evidence.seq, 1);
        assert_eq!(evidence.plaintext_to_proof, body.plaintext[32..64].to_vec());
        assert_eq!(evidence.ciphertext_to_proof, body.record.payload[32..64].to_vec());
        assert_eq!(evidence.galois_key_cipher, app_keys.aead().ecb0());

        let extract =
            PolicyExtract::new(&policy, &location, &body.plaintext, &evidence, &schedule);
        assert_eq!(extract.seq, "0000000000000001");
        assert_eq!(extract.dot_position, 3);
        assert_eq!(extract.threshold, "9800");
        assert_eq!(extract.compare_max_bit_len, 126);

        let shared = extract.shared();
        assert_eq!(shared.seq().unwrap(), 1);
        assert_eq!(shared.hkdf_shts_first_block, extract.hkdf_shts_first_block);
        assert_eq!(shared.first_blocks().unwrap(), schedule.first_blocks);

        let json = String::from_utf8(storage::to_json(&shared).unwrap()).unwrap();
        assert!(json.starts_with("{\n \"StartBlockIdx\": 2,\n \"EndBlockIdx\": 4,"));
        assert!(!json.contains("HandshakeSecret"));
    }

    #[test]
    fn test_seq_hex() {
        assert_eq!(seq_hex(0x0102), "0000000000000102");
    }
}
