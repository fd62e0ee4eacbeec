//! Record parameters, declared tag inputs and their verification.

use std::{collections::BTreeMap, path::Path};

use gcm::{check_tag, Block, TAG_SIZE};
use serde::{Deserialize, Serialize};
use tls_core::{
    cipher::CipherState, msgs::enums::ContentType, record::OpaqueRecord,
    replay::ApplicationRecord,
};
use tracing::{debug, instrument};

use crate::{storage, Error};

/// A disclosed application data record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordParam {
    /// Encrypted payload followed by the tag, in hex.
    pub ciphertext: String,
    /// The 5-byte record header, in hex.
    #[serde(rename = "additionalData")]
    pub additional_data: String,
}

/// Tag inputs the prover declares for a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredTag {
    /// `E_k(0^128)`, in hex.
    #[serde(rename = "ECB0")]
    pub ecb0: String,
    /// `E_k(J0)`, in hex.
    #[serde(rename = "ECBK")]
    pub ecbk: String,
}

/// A record whose tag was recomputed from declared inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedRecord {
    #[allow(missing_docs)]
    pub tag: String,
    /// Ciphertext without the tag.
    #[serde(rename = "cipherChunks")]
    pub cipher_chunks: String,
    #[allow(missing_docs)]
    pub ecb0: String,
    #[allow(missing_docs)]
    pub ecbk: String,
}

/// Record parameters keyed by decimal sequence number.
pub type RecordParams = BTreeMap<String, RecordParam>;
/// Declared tag inputs keyed by decimal sequence number.
pub type DeclaredTags = BTreeMap<String, DeclaredTag>;
/// Confirmed records keyed by decimal sequence number.
pub type ConfirmedRecords = BTreeMap<String, ConfirmedRecord>;

/// Collects the parameters of the application epoch records of the server.
///
/// Records are numbered from zero in the order they were captured.
pub fn record_params(records: &[OpaqueRecord]) -> RecordParams {
    records
        .iter()
        .enumerate()
        .filter(|(_, record)| record.typ == ContentType::ApplicationData)
        .map(|(seq, record)| {
            (
                seq.to_string(),
                RecordParam {
                    ciphertext: hex::encode(&record.payload),
                    additional_data: hex::encode(record.header()),
                },
            )
        })
        .collect()
}

/// Declares the tag inputs of `records`, decrypted under `keys`.
pub fn declare_tags(
    records: &[ApplicationRecord],
    keys: &CipherState,
) -> Result<DeclaredTags, Error> {
    let ecb0 = hex::encode(keys.aead().ecb0());

    records
        .iter()
        .map(|record| {
            let ecbk = keys.aead().tag_mask(&keys.nonce(record.seq))?;
            Ok((
                record.seq.to_string(),
                DeclaredTag {
                    ecb0: ecb0.clone(),
                    ecbk: hex::encode(ecbk),
                },
            ))
        })
        .collect()
}

/// Recomputes the tag of every declared record and compares it against the
/// tag carried by the record.
///
/// Records without a declared entry are skipped. Any mismatch fails the
/// whole check.
#[instrument(level = "debug", skip_all, err)]
pub fn check_auth_tags(
    params: &RecordParams,
    declared: &DeclaredTags,
) -> Result<ConfirmedRecords, Error> {
    let mut confirmed = ConfirmedRecords::new();

    for (seq, param) in params {
        let Some(tag_inputs) = declared.get(seq) else {
            debug!("record {} has no declared tag inputs", seq);
            continue;
        };

        let ecb0: Block = storage::decode_array("ECB0", &tag_inputs.ecb0)?;
        let ecbk: Block = storage::decode_array("ECBK", &tag_inputs.ecbk)?;
        let ciphertext = storage::decode_hex("ciphertext", &param.ciphertext)?;
        let aad = storage::decode_hex("additionalData", &param.additional_data)?;

        let check = check_tag(&ecb0, &ecbk, &aad, &ciphertext).map_err(|e| {
            Error::framing()
                .with_msg(format!("record {seq} is shorter than a tag"))
                .with_source(e)
        })?;
        if !check.is_match() {
            return Err(Error::authentication().with_msg(format!(
                "authtag13 verification failed for record {seq}"
            )));
        }

        let (cipher_chunks, tag) = ciphertext.split_at(ciphertext.len() - TAG_SIZE);
        confirmed.insert(
            seq.clone(),
            ConfirmedRecord {
                tag: hex::encode(tag),
                cipher_chunks: hex::encode(cipher_chunks),
                ecb0: tag_inputs.ecb0.clone(),
                ecbk: tag_inputs.ecbk.clone(),
            },
        );
        debug!("confirmed tag of record {}", seq);
    }

    Ok(confirmed)
}

/// Reads declared tag inputs.
pub fn load_declared_tags(path: &Path) -> Result<DeclaredTags, Error> {
    storage::read_json(path)
}

/// Writes declared tag inputs.
pub fn store_declared_tags(path: &Path, declared: &DeclaredTags) -> Result<(), Error> {
    storage::write_json(path, declared)
}

/// Writes confirmed records.
pub fn store_confirmed_records(path: &Path, confirmed: &ConfirmedRecords) -> Result<(), Error> {
    storage::write_json(path, confirmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use rstest::*;
    use tls_core::{fixtures::SessionFixture, replay::decrypt_application_data, HandshakeReplay};

    struct Session {
        records: Vec<OpaqueRecord>,
        keys: CipherState,
    }

    #[fixture]
    fn session() -> Session {
        let fixture = SessionFixture::new();
        let keys =
            CipherState::from_traffic_secret(&fixture.secrets.server_handshake_traffic_secret)
                .unwrap();
        let handshake = HandshakeReplay::new(&fixture.client_capture, &fixture.server_capture)
            .unwrap()
            .finish(keys, None)
            .unwrap();

        Session {
            records: handshake.server_records,
            keys: CipherState::from_traffic_secret(
                &fixture.secrets.server_application_traffic_secret,
            )
            .unwrap(),
        }
    }

    fn declared(session: &Session) -> DeclaredTags {
        let decrypted = decrypt_application_data(&session.records, session.keys.clone()).unwrap();
        declare_tags(&decrypted, &session.keys).unwrap()
    }

    #[rstest]
    fn test_record_params(session: Session) {
        let params = record_params(&session.records);

        assert_eq!(params.len(), session.records.len());
        assert_eq!(params["0"].additional_data, hex::encode(session.records[0].header()));
        assert_eq!(params["1"].ciphertext, hex::encode(&session.records[1].payload));
    }

    #[rstest]
    fn test_check_auth_tags(session: Session) {
        let params = record_params(&session.records);
        let declared = declared(&session);

        let confirmed = check_auth_tags(&params, &declared).unwrap();

        assert_eq!(confirmed.len(), declared.len());
        let payload = &session.records[1].payload;
        assert_eq!(confirmed["1"].tag, hex::encode(&payload[payload.len() - TAG_SIZE..]));
        assert_eq!(
            confirmed["1"].cipher_chunks,
            hex::encode(&payload[..payload.len() - TAG_SIZE])
        );

        // Checking twice yields the same output.
        assert_eq!(check_auth_tags(&params, &declared).unwrap(), confirmed);
    }

    #[rstest]
    fn test_undeclared_records_are_skipped(session: Session) {
        let params = record_params(&session.records);
        let mut declared = declared(&session);
        declared.remove("0");

        let confirmed = check_auth_tags(&params, &declared).unwrap();

        assert!(!confirmed.contains_key("0"));
        assert!(confirmed.contains_key("1"));
    }

    #[rstest]
    fn test_tampered_ciphertext_fails(session: Session) {
        let mut rng = StdRng::seed_from_u64(0);
        let mut params = record_params(&session.records);
        let declared = declared(&session);

        let param = params.get_mut("1").unwrap();
        let mut ciphertext = hex::decode(&param.ciphertext).unwrap();
        let idx = rng.random_range(0..ciphertext.len());
        ciphertext[idx] ^= 1 << rng.random_range(0..8);
        param.ciphertext = hex::encode(ciphertext);

        let err = check_auth_tags(&params, &declared).unwrap_err();

        assert!(err.is_authentication());
        assert!(err.to_string().contains("authtag13 verification failed"));
    }

    #[rstest]
    fn test_wrong_mask_fails(session: Session) {
        let params = record_params(&session.records);
        let mut declared = declared(&session);
        let mask = declared["1"].ecbk.clone();
        declared.get_mut("0").unwrap().ecbk = mask;

        assert!(check_auth_tags(&params, &declared).unwrap_err().is_authentication());
    }

    #[rstest]
    #[case::bad_hex("zz")]
    #[case::short("00ff")]
    fn test_malformed_declared_entry(session: Session, #[case] ecb0: &str) {
        let params = record_params(&session.records);
        let mut declared = declared(&session);
        declared.get_mut("1").unwrap().ecb0 = ecb0.to_string();

        assert!(check_auth_tags(&params, &declared).unwrap_err().is_encoding());
    }

    #[test]
    fn test_json_names() {
        let declared = DeclaredTag {
            ecb0: "00".into(),
            ecbk: "01".into(),
        };
        let confirmed = ConfirmedRecord {
            tag: "02".into(),
            cipher_chunks: "03".into(),
            ecb0: "00".into(),
            ecbk: "01".into(),
        };

        assert_eq!(
            serde_json::to_string(&declared).unwrap(),
            r#"{"ECB0":"00","ECBK":"01"}"#
        );
        assert_eq!(
            serde_json::to_string(&confirmed).unwrap(),
            r#"{"tag":"02","cipherChunks":"03","ecb0":"00","ecbk":"01"}"#
        );
    }
}
