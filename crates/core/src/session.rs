//! Prover and verifier pipelines over a storage directory.
//!
//! Both sides replay the same captures. The prover holds the handshake
//! secret and writes the evidence, the verifier only reads what the prover
//! disclosed and writes the public inputs it could confirm.

use hmac_sha256::hkdf_expand_label;
use tls_core::{
    cipher::CipherState,
    replay::decrypt_application_data,
    verify::{ServerCertVerifier, WebPkiVerifier},
    HandshakeReplay, ServerHandshake,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    extract::{PolicyExtract, RecordEvidence, SharedPolicyExtract},
    kdc::{verify_server_finished, KdcPublicInput},
    key_schedule::{KeySchedule, SERVER_HS_TRAFFIC},
    params::TlsParameters,
    policy::{CompiledPolicy, Policy},
    records::{self, ConfirmedRecords, DeclaredTags},
    statement::Statement,
    storage,
    transcript::Checkpoints,
    Error, ReplayConfig,
};

/// Everything the prover wrote for a session.
#[derive(Debug)]
pub struct ProverOutput {
    /// The private extract.
    pub extract: PolicyExtract,
    /// The disclosed extract.
    pub shared: SharedPolicyExtract,
    /// The disclosed key schedule values.
    pub params: TlsParameters,
    /// Tag inputs of every server application data record.
    pub declared: DeclaredTags,
    /// The located value.
    pub value: String,
    /// Whether the value satisfies the constraint of the policy.
    pub satisfied: bool,
}

/// Prover side of a session.
#[derive(Debug)]
pub struct ProverSession {
    config: ReplayConfig,
    policy: CompiledPolicy,
}

impl ProverSession {
    /// Creates a prover session for `policy`.
    pub fn new(config: ReplayConfig, policy: &Policy) -> Result<Self, Error> {
        Ok(Self {
            config,
            policy: policy.compile()?,
        })
    }

    /// Returns the compiled policy.
    pub fn policy(&self) -> &CompiledPolicy {
        &self.policy
    }

    /// Replays the session with `handshake_secret` and writes the policy
    /// extracts, the TLS parameters and the declared tag inputs.
    ///
    /// Nothing is written unless every stage succeeds.
    #[instrument(level = "debug", skip_all, err)]
    pub fn run(&self, handshake_secret: &[u8]) -> Result<ProverOutput, Error> {
        if handshake_secret.len() != 32 {
            return Err(Error::config().with_msg(format!(
                "handshake secret must be 32 bytes, got {}",
                handshake_secret.len()
            )));
        }

        let client = storage::read_capture(&self.config.client_capture_path())?;
        let server = storage::read_capture(&self.config.server_capture_path())?;

        let replay = HandshakeReplay::new(&client, &server)?;
        let shts = hkdf_expand_label(
            handshake_secret,
            SERVER_HS_TRAFFIC,
            &replay.transcript().current_hash(),
            32,
        )?;
        let verifier = self.config.cert_verifier()?;
        let handshake = replay.finish(
            CipherState::from_traffic_secret(&shts)?,
            dyn_verifier(&verifier),
        )?;
        info!("replayed handshake");

        let checkpoints = Checkpoints::from_handshake(&handshake);
        let schedule = KeySchedule::derive(handshake_secret, &checkpoints)?;
        if schedule.server_finished.as_slice() != handshake.finished_verify_data() {
            return Err(Error::authentication()
                .with_msg("server Finished does not match the handshake secret"));
        }
        debug!("derived key schedule");

        self.check_request(&handshake, &schedule)?;

        let app_keys = schedule.server_application_keys()?;
        let decrypted = decrypt_application_data(&handshake.server_records, app_keys.clone())?;
        info!("decrypted {} application data records", decrypted.len());

        let (record, location) = decrypted
            .iter()
            .find_map(|record| match self.policy.locate(&record.plaintext) {
                Some(location) => Some((record, location)),
                None => {
                    debug!("no match in record {}", record.seq);
                    None
                }
            })
            .ok_or_else(|| Error::policy().with_msg("policy not satisfiable"))?;
        info!("located value in record {}", record.seq);

        let value = String::from_utf8_lossy(location.value(&record.plaintext)).into_owned();
        let satisfied = self.policy.evaluate(&value)?;
        if !satisfied {
            warn!(
                "value {} does not satisfy {} {}",
                value,
                self.policy.operator().as_str(),
                self.policy.threshold()
            );
        }

        let evidence =
            RecordEvidence::prepare(&app_keys, record.seq, &record.record, &location)?;
        let extract = PolicyExtract::new(
            &self.policy,
            &location,
            &record.plaintext,
            &evidence,
            &schedule,
        );
        let shared = extract.shared();
        let params = TlsParameters::from_schedule(&schedule);
        let declared = records::declare_tags(&decrypted, &app_keys)?;

        extract.store(&self.config.policy_extract_path())?;
        shared.store(&self.config.shared_policy_extract_path())?;
        params.store(&self.config.tls_params_path())?;
        records::store_declared_tags(&self.config.record_tags_path(), &declared)?;
        info!("wrote policy extracts");

        Ok(ProverOutput {
            extract,
            shared,
            params,
            declared,
            value,
            satisfied,
        })
    }

    fn check_request(
        &self,
        handshake: &ServerHandshake,
        schedule: &KeySchedule,
    ) -> Result<(), Error> {
        let requests = decrypt_application_data(
            handshake.client_application_records(schedule.client_handshake_keys()?)?,
            schedule.client_application_keys()?,
        )?;
        let Some(request) = requests.first() else {
            warn!("no client application data to check against the policy");
            return Ok(());
        };

        if !self.policy.request_targets_api(&request.plaintext) {
            return Err(Error::policy().with_msg(format!(
                "request does not target {}/{}",
                self.policy.host(),
                self.policy.endpoint()
            )));
        }
        debug!("request targets the policy api");

        Ok(())
    }
}

/// Everything the verifier confirmed for a session.
#[derive(Debug)]
pub struct VerifierOutput {
    /// The replayed handshake.
    pub handshake: ServerHandshake,
    /// Transcript checkpoints.
    pub checkpoints: Checkpoints,
    /// Key schedule public input.
    pub kdc: KdcPublicInput,
    /// Records whose tags were recomputed.
    pub confirmed: ConfirmedRecords,
}

/// Verifier side of a session.
#[derive(Debug)]
pub struct VerifierSession {
    config: ReplayConfig,
}

impl VerifierSession {
    /// Creates a verifier session.
    pub fn new(config: ReplayConfig) -> Self {
        Self { config }
    }

    /// Replays the session with the disclosed TLS parameters, verifies the
    /// server Finished message and the declared record tags, and writes the
    /// public inputs.
    #[instrument(level = "debug", skip_all, err)]
    pub fn run(&self) -> Result<VerifierOutput, Error> {
        let params = TlsParameters::load(&self.config.tls_params_path())?;
        let client = storage::read_capture(&self.config.client_capture_path())?;
        let server = storage::read_capture(&self.config.server_capture_path())?;

        let verifier = self.config.cert_verifier()?;
        let handshake = HandshakeReplay::new(&client, &server)?
            .finish(params.server_handshake_keys()?, dyn_verifier(&verifier))?;
        info!("replayed handshake");

        let checkpoints = Checkpoints::from_handshake(&handshake);
        verify_server_finished(&params, &checkpoints, handshake.finished_verify_data())?;
        info!("verified server Finished");

        let kdc = KdcPublicInput::compute(&params, &checkpoints)?;
        kdc.store(&self.config.kdc_public_input_path())?;

        let record_params = records::record_params(&handshake.server_records);
        let declared = records::load_declared_tags(&self.config.record_tags_path())?;
        let confirmed = records::check_auth_tags(&record_params, &declared)?;
        records::store_confirmed_records(&self.config.confirmed_records_path(), &confirmed)?;
        info!("confirmed {} record tags", confirmed.len());

        Ok(VerifierOutput {
            handshake,
            checkpoints,
            kdc,
            confirmed,
        })
    }

    /// Builds and writes the statement for the shared policy extract of the
    /// session in `output`.
    ///
    /// The disclosed record must be one whose tag was confirmed.
    #[instrument(level = "debug", skip_all, err)]
    pub fn statement(&self, output: &VerifierOutput, policy: &Policy) -> Result<Statement, Error> {
        let policy = policy.compile()?;
        let shared = SharedPolicyExtract::load(&self.config.shared_policy_extract_path())?;
        let seq = shared.seq()?;

        if !output.confirmed.contains_key(&seq.to_string()) {
            return Err(Error::authentication().with_msg(format!(
                "record {seq} of the shared extract was not confirmed"
            )));
        }
        let record = usize::try_from(seq)
            .ok()
            .and_then(|idx| output.handshake.server_records.get(idx))
            .ok_or_else(|| {
                Error::framing().with_msg(format!("record {seq} is not in the capture"))
            })?;

        let statement = Statement::build(
            &shared,
            &policy,
            &output.checkpoints,
            output.handshake.finished_verify_data(),
            record,
        )?;
        statement.store(&self.config.statement_path())?;
        info!("wrote statement for record {}", seq);

        Ok(statement)
    }
}

fn dyn_verifier(verifier: &Option<WebPkiVerifier>) -> Option<&dyn ServerCertVerifier> {
    verifier.as_ref().map(|v| v as &dyn ServerCertVerifier)
}
