use std::path::{Path, PathBuf};

use origo_core::{
    policy::{Api, Constraint, Policy, Proxy},
    storage, ProverSession, ReplayConfig, VerifierSession,
};
use rstest::*;
use tls_core::fixtures::{self, SessionFixture};

const PATTERN: &str = "\"stock_value\": \"[0-9]+.[0-9]+\",";

fn policy(url: &str, pattern: &str, constraint: &str, value: &str) -> Policy {
    Policy {
        apis: vec![Api {
            url: url.into(),
            content_type: "application/json".into(),
            pattern: pattern.into(),
            creds: false,
        }],
        constraints: vec![Constraint {
            value: value.into(),
            constraint: constraint.into(),
        }],
        proxies: vec![Proxy {
            host: "localhost".into(),
            port: "8082".into(),
            mode: "signature".into(),
            pub_key: String::new(),
            algorithm: String::new(),
        }],
    }
}

#[fixture]
fn stock_policy() -> Policy {
    policy(
        "https://api.example.com/v1/quote?symbol=ACME",
        PATTERN,
        "GT",
        "98.00",
    )
}

fn session_dir(name: &str, fixture: &SessionFixture) -> (PathBuf, ReplayConfig) {
    let dir = std::env::temp_dir().join(format!("origo-core-{}-{}", std::process::id(), name));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();

    storage::write_capture(&dir.join("ClientSentRecords.raw"), &fixture.client_capture).unwrap();
    storage::write_capture(&dir.join("ServerSentRecords.raw"), &fixture.server_capture).unwrap();
    std::fs::write(dir.join("ca.pem"), fixtures::CA_PEM).unwrap();

    let config = ReplayConfig::builder()
        .storage_dir(dir.clone())
        .root_ca(dir.join("ca.pem"))
        .verification_time(fixtures::VERIFICATION_TIME)
        .build()
        .unwrap();

    (dir, config)
}

fn flip_last_record_byte(path: &Path) {
    let mut capture = std::fs::read(path).unwrap();
    let idx = capture.len() - 20;
    capture[idx] ^= 0x01;
    std::fs::write(path, capture).unwrap();
}

#[rstest]
fn test_prover_then_verifier(stock_policy: Policy) {
    let _ = tracing_subscriber::fmt::try_init();
    let fixture = SessionFixture::new();
    let (dir, config) = session_dir("e2e", &fixture);

    let prover = ProverSession::new(config.clone(), &stock_policy).unwrap();
    let output = prover.run(&fixture.secrets.handshake_secret).unwrap();

    assert_eq!(output.value, "142.50");
    assert!(output.satisfied);
    assert_eq!(output.extract.dot_position, 3);
    assert_eq!(output.extract.seq, "0000000000000001");
    assert_eq!(output.extract.threshold, "9800");
    for file in [
        "PolicyExtractJson.json",
        "PolicyExtractJsonShared.json",
        "kdc_shared.json",
        "recordtag_public_input.json",
    ] {
        assert!(dir.join(file).exists(), "{file} missing");
    }

    let verifier = VerifierSession::new(config);
    let confirmed = verifier.run().unwrap();
    assert!(confirmed.confirmed.contains_key("1"));
    assert!(dir.join("kdc_confirmed.json").exists());
    assert!(dir.join("record_confirmed.json").exists());

    let statement = verifier.statement(&confirmed, &stock_policy).unwrap();
    assert_eq!(statement.threshold, "9800");
    assert_eq!(statement.operator, "GT");
    assert_eq!(statement.seq_counter, output.shared.seq);
    assert_eq!(statement.hkdf_sf, hex::encode(&fixture.server_finished));
    assert_eq!(
        statement.hkdf_shts_inner_hash,
        output.extract.hkdf_shts_inner_hash
    );
    assert_eq!(statement.ciphertext_to_proof, output.extract.ciphertext_to_proof);
    assert!(dir.join("PolicyExtractStatement.json").exists());

    let _ = std::fs::remove_dir_all(dir);
}

#[rstest]
fn test_reruns_are_byte_identical(stock_policy: Policy) {
    let fixture = SessionFixture::new();
    let (dir, config) = session_dir("rerun", &fixture);
    let prover = ProverSession::new(config.clone(), &stock_policy).unwrap();
    let verifier = VerifierSession::new(config);

    let files = [
        "PolicyExtractJson.json",
        "PolicyExtractJsonShared.json",
        "kdc_shared.json",
        "recordtag_public_input.json",
        "kdc_confirmed.json",
        "record_confirmed.json",
    ];
    let run = || {
        prover.run(&fixture.secrets.handshake_secret).unwrap();
        verifier.run().unwrap();
        files
            .iter()
            .map(|file| std::fs::read(dir.join(file)).unwrap())
            .collect::<Vec<_>>()
    };

    assert_eq!(run(), run());

    let _ = std::fs::remove_dir_all(dir);
}

#[rstest]
fn test_session_ticket_shifts_sequence(stock_policy: Policy) {
    let fixture = SessionFixture::builder().new_session_ticket().build();
    let (dir, config) = session_dir("ticket", &fixture);

    let output = ProverSession::new(config.clone(), &stock_policy)
        .unwrap()
        .run(&fixture.secrets.handshake_secret)
        .unwrap();
    assert_eq!(output.extract.seq, "0000000000000002");
    assert!(!output.declared.contains_key("0"));

    let verifier = VerifierSession::new(config);
    let confirmed = verifier.run().unwrap();
    assert!(!confirmed.confirmed.contains_key("0"));
    assert!(confirmed.confirmed.contains_key("2"));
    verifier.statement(&confirmed, &stock_policy).unwrap();

    let _ = std::fs::remove_dir_all(dir);
}

#[rstest]
fn test_client_certificate_flight(stock_policy: Policy) {
    let fixture = SessionFixture::builder().client_certificate().build();
    let (dir, config) = session_dir("client-cert", &fixture);

    let output = ProverSession::new(config.clone(), &stock_policy)
        .unwrap()
        .run(&fixture.secrets.handshake_secret)
        .unwrap();
    assert_eq!(output.value, "142.50");
    assert_eq!(output.extract.seq, "0000000000000001");

    let verifier = VerifierSession::new(config);
    let confirmed = verifier.run().unwrap();
    verifier.statement(&confirmed, &stock_policy).unwrap();

    let _ = std::fs::remove_dir_all(dir);
}

#[rstest]
fn test_request_to_other_endpoint_behind_client_certificate() {
    let fixture = SessionFixture::builder()
        .client_certificate()
        .request(&b"GET /v2/admin HTTP/1.1\r\nHost: api.example.com\r\n\r\n"[..])
        .build();
    let (dir, config) = session_dir("client-cert-request", &fixture);
    let policy = policy(
        "https://api.example.com/v1/quote?symbol=ACME",
        PATTERN,
        "GT",
        "98.00",
    );

    let err = ProverSession::new(config, &policy)
        .unwrap()
        .run(&fixture.secrets.handshake_secret)
        .unwrap_err();
    assert!(err.is_policy());
    assert!(!dir.join("PolicyExtractJson.json").exists());

    let _ = std::fs::remove_dir_all(dir);
}

#[rstest]
fn test_tampered_record_writes_nothing(stock_policy: Policy) {
    let fixture = SessionFixture::new();
    let (dir, config) = session_dir("tamper-prover", &fixture);
    flip_last_record_byte(&dir.join("ServerSentRecords.raw"));

    let err = ProverSession::new(config, &stock_policy)
        .unwrap()
        .run(&fixture.secrets.handshake_secret)
        .unwrap_err();

    assert!(err.is_authentication());
    assert!(!dir.join("PolicyExtractJson.json").exists());
    assert!(!dir.join("PolicyExtractJsonShared.json").exists());

    let _ = std::fs::remove_dir_all(dir);
}

#[rstest]
fn test_verifier_rejects_tampered_record(stock_policy: Policy) {
    let fixture = SessionFixture::new();
    let (dir, config) = session_dir("tamper-verifier", &fixture);
    ProverSession::new(config.clone(), &stock_policy)
        .unwrap()
        .run(&fixture.secrets.handshake_secret)
        .unwrap();

    flip_last_record_byte(&dir.join("ServerSentRecords.raw"));
    let err = VerifierSession::new(config).run().unwrap_err();

    assert!(err.is_authentication());
    assert!(!dir.join("record_confirmed.json").exists());

    let _ = std::fs::remove_dir_all(dir);
}

#[rstest]
fn test_verifier_rejects_wrong_shts(stock_policy: Policy) {
    let fixture = SessionFixture::new();
    let (dir, config) = session_dir("wrong-shts", &fixture);
    ProverSession::new(config.clone(), &stock_policy)
        .unwrap()
        .run(&fixture.secrets.handshake_secret)
        .unwrap();

    let path = dir.join("kdc_shared.json");
    let mut params: serde_json::Map<String, serde_json::Value> =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    params.insert("SHTSin".into(), hex::encode([0u8; 32]).into());
    std::fs::write(&path, serde_json::to_vec(&params).unwrap()).unwrap();

    let err = VerifierSession::new(config).run().unwrap_err();
    assert!(err.is_authentication());
    assert!(!dir.join("kdc_confirmed.json").exists());

    let _ = std::fs::remove_dir_all(dir);
}

#[rstest]
fn test_wrong_handshake_secret(stock_policy: Policy) {
    let fixture = SessionFixture::new();
    let (dir, config) = session_dir("wrong-secret", &fixture);

    let err = ProverSession::new(config, &stock_policy)
        .unwrap()
        .run(&[7u8; 32])
        .unwrap_err();

    assert!(err.is_authentication());
    assert!(!dir.join("kdc_shared.json").exists());

    let _ = std::fs::remove_dir_all(dir);
}

#[rstest]
#[case::no_match(
    "unmatched",
    "https://api.example.com/v1/quote?symbol=ACME",
    "\"price\": \"[0-9]+.[0-9]+\","
)]
#[case::other_endpoint("other-endpoint", "https://api.example.com/v2/orders", PATTERN)]
#[case::other_host("other-host", "https://api.example.org/v1/quote?symbol=ACME", PATTERN)]
fn test_policy_errors(#[case] name: &str, #[case] url: &str, #[case] pattern: &str) {
    let fixture = SessionFixture::new();
    let (dir, config) = session_dir(name, &fixture);

    let err = ProverSession::new(config, &policy(url, pattern, "GT", "98.00"))
        .unwrap()
        .run(&fixture.secrets.handshake_secret)
        .unwrap_err();

    assert!(err.is_policy());
    assert!(!dir.join("PolicyExtractJson.json").exists());

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn test_unsatisfied_constraint_is_reported() {
    let fixture = SessionFixture::new();
    let (dir, config) = session_dir("unsatisfied", &fixture);

    let output = ProverSession::new(
        config,
        &policy(
            "https://api.example.com/v1/quote?symbol=ACME",
            PATTERN,
            "LT",
            "100.00",
        ),
    )
    .unwrap()
    .run(&fixture.secrets.handshake_secret)
    .unwrap();

    assert!(!output.satisfied);
    assert_eq!(output.extract.threshold, "10000");

    let _ = std::fs::remove_dir_all(dir);
}
