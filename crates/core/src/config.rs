//! Replay configuration.

use std::path::{Path, PathBuf};

use tls_core::{anchors::RootCertStore, verify::WebPkiVerifier};

use crate::Error;

const CLIENT_CAPTURE: &str = "ClientSentRecords.raw";
const SERVER_CAPTURE: &str = "ServerSentRecords.raw";
const TLS_PARAMS: &str = "kdc_shared.json";
const RECORD_TAGS: &str = "recordtag_public_input.json";
const KDC_PUBLIC_INPUT: &str = "kdc_confirmed.json";
const CONFIRMED_RECORDS: &str = "record_confirmed.json";
const POLICY_EXTRACT: &str = "PolicyExtractJson.json";
const SHARED_POLICY_EXTRACT: &str = "PolicyExtractJsonShared.json";
const STATEMENT: &str = "PolicyExtractStatement.json";

/// Configuration shared by [`ProverSession`](crate::ProverSession) and
/// [`VerifierSession`](crate::VerifierSession).
///
/// All file names are relative to [`storage_dir`](Self::storage_dir).
#[derive(derive_builder::Builder, Clone, Debug, PartialEq, Eq)]
pub struct ReplayConfig {
    /// Directory holding the captures and every interchange file.
    #[builder(setter(into), default = "PathBuf::from(\".\")")]
    storage_dir: PathBuf,
    /// Bytes sent by the client.
    #[builder(setter(into), default = "CLIENT_CAPTURE.to_string()")]
    client_capture: String,
    /// Bytes sent by the server.
    #[builder(setter(into), default = "SERVER_CAPTURE.to_string()")]
    server_capture: String,
    /// Key schedule values disclosed by the prover.
    #[builder(setter(into), default = "TLS_PARAMS.to_string()")]
    tls_params: String,
    /// `ECB0`/`ECBK` pairs declared by the prover, keyed by sequence number.
    #[builder(setter(into), default = "RECORD_TAGS.to_string()")]
    record_tags: String,
    /// Key schedule public input computed by the verifier.
    #[builder(setter(into), default = "KDC_PUBLIC_INPUT.to_string()")]
    kdc_public_input: String,
    /// Records whose tags the verifier recomputed.
    #[builder(setter(into), default = "CONFIRMED_RECORDS.to_string()")]
    confirmed_records: String,
    /// Private policy extract.
    #[builder(setter(into), default = "POLICY_EXTRACT.to_string()")]
    policy_extract: String,
    /// Shared policy extract.
    #[builder(setter(into), default = "SHARED_POLICY_EXTRACT.to_string()")]
    shared_policy_extract: String,
    /// Public input statement built from the shared extract.
    #[builder(setter(into), default = "STATEMENT.to_string()")]
    statement: String,
    /// PEM file with the trusted roots. Without it certificates are not
    /// verified.
    #[builder(setter(into, strip_option), default)]
    root_ca: Option<PathBuf>,
    /// Unix time at which certificates are checked, the current time if
    /// unset.
    #[builder(setter(strip_option), default)]
    verification_time: Option<u64>,
}

impl ReplayConfig {
    /// Creates a new builder for `ReplayConfig`.
    pub fn builder() -> ReplayConfigBuilder {
        ReplayConfigBuilder::default()
    }

    /// Creates a configuration with default file names in `storage_dir`.
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            client_capture: CLIENT_CAPTURE.into(),
            server_capture: SERVER_CAPTURE.into(),
            tls_params: TLS_PARAMS.into(),
            record_tags: RECORD_TAGS.into(),
            kdc_public_input: KDC_PUBLIC_INPUT.into(),
            confirmed_records: CONFIRMED_RECORDS.into(),
            policy_extract: POLICY_EXTRACT.into(),
            shared_policy_extract: SHARED_POLICY_EXTRACT.into(),
            statement: STATEMENT.into(),
            root_ca: None,
            verification_time: None,
        }
    }

    /// Returns the storage directory.
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Returns the path of the client capture.
    pub fn client_capture_path(&self) -> PathBuf {
        self.storage_dir.join(&self.client_capture)
    }

    /// Returns the path of the server capture.
    pub fn server_capture_path(&self) -> PathBuf {
        self.storage_dir.join(&self.server_capture)
    }

    /// Returns the path of the TLS parameters file.
    pub fn tls_params_path(&self) -> PathBuf {
        self.storage_dir.join(&self.tls_params)
    }

    /// Returns the path of the declared record tag file.
    pub fn record_tags_path(&self) -> PathBuf {
        self.storage_dir.join(&self.record_tags)
    }

    /// Returns the path of the key schedule public input.
    pub fn kdc_public_input_path(&self) -> PathBuf {
        self.storage_dir.join(&self.kdc_public_input)
    }

    /// Returns the path of the confirmed records file.
    pub fn confirmed_records_path(&self) -> PathBuf {
        self.storage_dir.join(&self.confirmed_records)
    }

    /// Returns the path of the private policy extract.
    pub fn policy_extract_path(&self) -> PathBuf {
        self.storage_dir.join(&self.policy_extract)
    }

    /// Returns the path of the shared policy extract.
    pub fn shared_policy_extract_path(&self) -> PathBuf {
        self.storage_dir.join(&self.shared_policy_extract)
    }

    /// Returns the path of the statement.
    pub fn statement_path(&self) -> PathBuf {
        self.storage_dir.join(&self.statement)
    }

    /// Returns the verification time, if fixed.
    pub fn verification_time(&self) -> Option<u64> {
        self.verification_time
    }

    /// Builds a certificate verifier from the configured roots, if any.
    pub fn cert_verifier(&self) -> Result<Option<WebPkiVerifier>, Error> {
        let Some(path) = &self.root_ca else {
            return Ok(None);
        };

        let pem = std::fs::read_to_string(path).map_err(|e| {
            Error::config()
                .with_msg(format!("failed to read root certificates {}", path.display()))
                .with_source(e)
        })?;
        let mut roots = RootCertStore::empty();
        roots.add_pem(&pem).map_err(|e| {
            Error::config()
                .with_msg("invalid root certificates")
                .with_source(e)
        })?;

        let verifier = WebPkiVerifier::new(roots);
        Ok(Some(match self.verification_time {
            Some(time) => verifier.with_time(time),
            None => verifier,
        }))
    }
}
