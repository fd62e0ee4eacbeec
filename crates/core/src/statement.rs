//! Public inputs of the policy proof, derived from a shared extract.

use std::path::Path;

use gcm::{check_tag, Block, TAG_SIZE};
use serde::{Deserialize, Serialize};
use tls_core::record::OpaqueRecord;
use tracing::{debug, instrument};

use crate::{
    extract::SharedPolicyExtract,
    key_schedule::InnerHashes,
    policy::{CompiledPolicy, BLOCK_LEN},
    storage,
    transcript::Checkpoints,
    Error,
};

/// Public inputs the verifier hands to the proof system.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "StartBlockIdx")]
    pub start_block_idx: usize,
    #[serde(rename = "EndBlockIdx")]
    pub end_block_idx: usize,
    #[serde(rename = "OffsetKeyValuePatternStart")]
    pub offset_key_value_pattern_start: usize,
    #[serde(rename = "KeyValuePatternLength")]
    pub key_value_pattern_length: usize,
    #[serde(rename = "OffsetValueStart")]
    pub offset_value_start: usize,
    #[serde(rename = "ValueLength")]
    pub value_length: usize,
    #[serde(rename = "DotPosition")]
    pub dot_position: usize,
    #[serde(rename = "CompareMaxBitLen")]
    pub compare_max_bit_len: usize,
    #[serde(rename = "Threshold")]
    pub threshold: String,
    #[serde(rename = "Operator")]
    pub operator: String,
    #[serde(rename = "SeqCounter")]
    pub seq_counter: String,
    #[serde(rename = "HkdfSF")]
    pub hkdf_sf: String,
    #[serde(rename = "KeyValueStartPattern")]
    pub key_value_start_pattern: String,
    #[serde(rename = "CiphertextToProof")]
    pub ciphertext_to_proof: String,
    #[serde(rename = "GaloisKeyCipher")]
    pub galois_key_cipher: String,
    #[serde(rename = "TaskMaskCipher")]
    pub task_mask_cipher: String,

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
}

impl Statement {
    /// Builds the statement for `shared`, which discloses a value inside
    /// `record`.
    ///
    /// `finished` is the verify data of the server Finished message read
    /// during replay.
    #[instrument(level = "debug", skip_all, fields(seq = %shared.seq), err)]
    pub fn build(
        shared: &SharedPolicyExtract,
        policy: &CompiledPolicy,
        checkpoints: &Checkpoints,
        finished: &[u8],
        record: &OpaqueRecord,
    ) -> Result<Self, Error> {
        if !policy.matches_key_prefix(shared.key_value_start_pattern.as_bytes()) {
            return Err(Error::policy().with_msg(format!(
                "disclosed pattern {} does not match the policy",
                shared.key_value_start_pattern
            )));
        }

        let ecb0: Block = storage::decode_array("GaloisKeyCipher", &shared.galois_key_cipher)?;
        let ecbk: Block = storage::decode_array("TaskMaskCipher", &shared.task_mask_cipher)?;
        let check = check_tag(&ecb0, &ecbk, &record.header(), &record.payload)?;
        if !check.is_match() {
            return Err(Error::authentication().with_msg(format!(
                "tag of record {} does not match the disclosed tag inputs",
                shared.seq
            )));
        }
        debug!("recomputed tag of the disclosed record");

        let cipher_len = record.payload.len() - TAG_SIZE;
        let start = shared.start_block_idx * BLOCK_LEN;
        let end = (shared.end_block_idx * BLOCK_LEN).min(cipher_len);
        if start >= end {
            return Err(Error::framing().with_msg(format!(
                "blocks {}..{} are outside record {}",
                shared.start_block_idx, shared.end_block_idx, shared.seq
            )));
        }

        let inner = InnerHashes::compute(&shared.first_blocks()?, checkpoints)?;

        Ok(Self {
            start_block_idx: shared.start_block_idx,
            end_block_idx: shared.end_block_idx,
            offset_key_value_pattern_start: shared.offset_key_value_pattern_start,
            key_value_pattern_length: shared.key_value_pattern_length,
            offset_value_start: shared.offset_value_start,
            value_length: shared.value_length,
            dot_position: shared.dot_position,
            compare_max_bit_len: policy.compare_max_bit_len(),
            threshold: policy.threshold().to_string(),
            operator: policy.operator().as_str().to_string(),
            seq_counter: shared.seq.clone(),
            hkdf_sf: hex::encode(finished),
            key_value_start_pattern: shared.key_value_start_pattern.clone(),
            ciphertext_to_proof: hex::encode(&record.payload[start..end]),
            galois_key_cipher: shared.galois_key_cipher.clone(),
            task_mask_cipher: shared.task_mask_cipher.clone(),
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
        })
    }

    /// Writes the statement to `path`.
    pub fn store(&self, path: &Path) -> Result<(), Error> {
        storage::write_json(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        extract::{PolicyExtract, RecordEvidence},
        key_schedule::KeySchedule,
        policy::{Api, Constraint, Policy, Proxy},
    };
    use rstest::*;
    use tls_core::{
        cipher::CipherState, fixtures::SessionFixture, replay::decrypt_application_data,
        HandshakeReplay, ServerHandshake,
    };

    fn policy(pattern: &str) -> CompiledPolicy {
        Policy {
            apis: vec![Api {
                url: "https://api.example.com/v1/quote".into(),
                content_type: "application/json".into(),
                pattern: pattern.into(),
                creds: false,
            }],
            constraints: vec![Constraint {
                value: "100.00".into(),
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

    struct Disclosed {
        handshake: ServerHandshake,
        checkpoints: Checkpoints,
        schedule: KeySchedule,
        shared: SharedPolicyExtract,
        policy: CompiledPolicy,
    }

    #[fixture]
    fn disclosed() -> Disclosed {
        let fixture = SessionFixture::new();
        let keys =
            CipherState::from_traffic_secret(&fixture.secrets.server_handshake_traffic_secret)
                .unwrap();
        let handshake = HandshakeReplay::new(&fixture.client_capture, &fixture.server_capture)
            .unwrap()
            .finish(keys, None)
            .unwrap();
        let checkpoints = Checkpoints::from_handshake(&handshake);
        let schedule =
            KeySchedule::derive(&fixture.secrets.handshake_secret, &checkpoints).unwrap();
        let app_keys = schedule.server_application_keys().unwrap();
        let records =
            decrypt_application_data(&handshake.server_records, app_keys.clone()).unwrap();

        let policy = policy("\"stock_value\": \"[0-9]+.[0-9]+\",");
        let body = &records[1];
        let location = policy.locate(&body.plaintext).unwrap();
        let evidence =
            RecordEvidence::prepare(&app_keys, body.seq, &body.record, &location).unwrap();
        let shared =
            PolicyExtract::new(&policy, &location, &body.plaintext, &evidence, &schedule).shared();

        Disclosed {
            handshake,
            checkpoints,
            schedule,
            shared,
            policy,
        }
    }

    fn build(d: &Disclosed) -> Result<Statement, Error> {
        Statement::build(
            &d.shared,
            &d.policy,
            &d.checkpoints,
            d.handshake.finished_verify_data(),
            &d.handshake.server_records[1],
        )
    }

    #[rstest]
    fn test_statement(disclosed: Disclosed) {
        let statement = build(&disclosed).unwrap();
        let inner = &disclosed.schedule.inner_hashes;

        assert_eq!(statement.seq_counter, "0000000000000001");
        assert_eq!(statement.threshold, "10000");
        assert_eq!(statement.operator, "GT");
        assert_eq!(statement.hkdf_sf, hex::encode(disclosed.schedule.server_finished));
        assert_eq!(statement.hkdf_shts_inner_hash, hex::encode(inner.shts));
        assert_eq!(statement.hkdf_cats_inner_hash, hex::encode(inner.cats));
        assert_eq!(statement.hkdf_kcapp_iv_inner_hash, hex::encode(inner.kcapp_iv));
        assert_eq!(
            statement.ciphertext_to_proof,
            hex::encode(&disclosed.handshake.server_records[1].payload[32..64])
        );
    }

    #[rstest]
    fn test_wrong_mask_is_rejected(mut disclosed: Disclosed) {
        let mut mask = hex::decode(&disclosed.shared.task_mask_cipher).unwrap();
        mask[0] ^= 1;
        disclosed.shared.task_mask_cipher = hex::encode(mask);

        assert!(build(&disclosed).unwrap_err().is_authentication());
    }

    #[rstest]
    fn test_wrong_record_is_rejected(disclosed: Disclosed) {
        let err = Statement::build(
            &disclosed.shared,
            &disclosed.policy,
            &disclosed.checkpoints,
            disclosed.handshake.finished_verify_data(),
            &disclosed.handshake.server_records[0],
        )
        .unwrap_err();

        assert!(err.is_authentication());
    }

    #[rstest]
    fn test_key_prefix_must_match(mut disclosed: Disclosed) {
        disclosed.policy = policy("\"open_value\": \"[0-9]+.[0-9]+\",");

        assert!(build(&disclosed).unwrap_err().is_policy());
    }

    #[rstest]
    fn test_inconsistent_first_blocks(mut disclosed: Disclosed) {
        disclosed.shared.hkdf_dhs_first_block = disclosed.shared.hkdf_ms_first_block.clone();

        assert!(build(&disclosed).unwrap_err().is_encoding());
    }
}
