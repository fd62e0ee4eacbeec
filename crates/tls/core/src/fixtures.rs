//! Fixtures for testing
//!
//! [`SessionFixture`] synthesizes the captures of a complete TLS 1.3
//! `TLS_AES_128_GCM_SHA256` session to `api.example.com`, using the real key
//! schedule, record protection and an Ed25519 certificate chain issued by a
//! test root.

use hmac_sha256::{hkdf_expand_label, hkdf_extract, hmac_sha256};
use ring::signature::Ed25519KeyPair;
use sha2::{Digest, Sha256};

use crate::{
    anchors::RootCertStore,
    cipher::{encrypt_record, CipherState},
    msgs::enums::{ContentType, HandshakeType},
    msgs::handshake::HandshakeMessage,
    record::OpaqueRecord,
    verify::{construct_tls13_server_verify_message, WebPkiVerifier},
};

/// DER encoding of the test root.
pub const CA_DER: &[u8] = include_bytes!("../testdata/ca.der");
/// PEM encoding of the test root.
pub const CA_PEM: &str = include_str!("../testdata/ca.pem");
/// DER encoding of the end entity certificate for [`SERVER_NAME`].
pub const EE_DER: &[u8] = include_bytes!("../testdata/ee.der");
const EE_KEY: &[u8] = include_bytes!("../testdata/ee.key.der");

/// Host name of the fixture server.
pub const SERVER_NAME: &str = "api.example.com";
/// Unix time at which the fixture chain is valid.
pub const VERIFICATION_TIME: u64 = 1_792_260_000;

/// Default request sent by the fixture client.
pub const REQUEST: &[u8] =
    b"GET /v1/quote?symbol=ACME HTTP/1.1\r\nHost: api.example.com\r\nAccept: application/json\r\n\r\n";

/// Default response sent by the fixture server, one entry per record.
pub const RESPONSE: &[&[u8]] = &[
    b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 96\r\n\r\n",
    b"{\"symbol\": \"ACME\", \"currency\": \"USD\", \"stock_value\": \"142.50\", \"exchange\": \"NYSE\", \"open\": true}",
];

/// Returns a root store holding the test root.
pub fn root_store() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.add(CA_DER).unwrap();
    roots
}

/// Returns a verifier trusting the test root at [`VERIFICATION_TIME`].
pub fn verifier() -> WebPkiVerifier {
    WebPkiVerifier::new(root_store()).with_time(VERIFICATION_TIME)
}

/// Secrets of a fixture session.
#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct SessionSecrets {
    pub handshake_secret: [u8; 32],
    pub client_handshake_traffic_secret: [u8; 32],
    pub server_handshake_traffic_secret: [u8; 32],
    pub master_secret: [u8; 32],
    pub client_application_traffic_secret: [u8; 32],
    pub server_application_traffic_secret: [u8; 32],
}

/// A synthesized session.
#[derive(Debug, Clone)]
pub struct SessionFixture {
    /// Bytes sent by the client.
    pub client_capture: Vec<u8>,
    /// Bytes sent by the server.
    pub server_capture: Vec<u8>,
    /// Key schedule secrets.
    pub secrets: SessionSecrets,
    /// Server Finished verify data.
    pub server_finished: Vec<u8>,
    /// Transcript hash through the server Certificate message.
    pub certificate_hash: [u8; 32],
    /// Transcript hash through the server CertificateVerify message.
    pub certificate_verify_hash: [u8; 32],
    /// Transcript hash through the server Finished message.
    pub server_finished_hash: [u8; 32],
}

impl SessionFixture {
    /// Returns the default session.
    pub fn new() -> Self {
        SessionBuilder::default().build()
    }

    /// Returns a builder for a customized session.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }
}

impl Default for SessionFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`SessionFixture`].
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    request: Vec<u8>,
    response: Vec<Vec<u8>>,
    certificate_request: bool,
    client_certificate: bool,
    new_session_ticket: bool,
    split_flight: bool,
    close_notify: bool,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            request: REQUEST.to_vec(),
            response: RESPONSE.iter().map(|r| r.to_vec()).collect(),
            certificate_request: false,
            client_certificate: false,
            new_session_ticket: false,
            split_flight: false,
            close_notify: false,
        }
    }
}

impl SessionBuilder {
    /// Sets the request.
    pub fn request(mut self, request: impl Into<Vec<u8>>) -> Self {
        self.request = request.into();
        self
    }

    /// Sets the response records.
    pub fn response(mut self, records: Vec<Vec<u8>>) -> Self {
        self.response = records;
        self
    }

    /// Sends a CertificateRequest after EncryptedExtensions.
    pub fn certificate_request(mut self) -> Self {
        self.certificate_request = true;
        self
    }

    /// Sends a CertificateRequest and has the client answer with an empty
    /// Certificate in its own record ahead of the client Finished.
    pub fn client_certificate(mut self) -> Self {
        self.certificate_request = true;
        self.client_certificate = true;
        self
    }

    /// Sends a NewSessionTicket before the response.
    pub fn new_session_ticket(mut self) -> Self {
        self.new_session_ticket = true;
        self
    }

    /// Spreads the encrypted server flight over records that split
    /// messages.
    pub fn split_flight(mut self) -> Self {
        self.split_flight = true;
        self
    }

    /// Ends the server stream with `close_notify`.
    pub fn close_notify(mut self) -> Self {
        self.close_notify = true;
        self
    }

    /// Builds the session.
    pub fn build(self) -> SessionFixture {
        let empty_hash: [u8; 32] = Sha256::digest(b"").into();
        let zeros = [0u8; 32];

        let early_secret = hkdf_extract(&zeros, &zeros).unwrap();
        let derived_early = expand(&early_secret, b"derived", &empty_hash);
        let handshake_secret = hkdf_extract(&derived_early, &[0x11; 32]).unwrap();

        let mut transcript = Vec::new();

        let client_hello = HandshakeMessage::encode(HandshakeType::ClientHello, &client_hello());
        let server_hello = HandshakeMessage::encode(HandshakeType::ServerHello, &server_hello());
        transcript.extend_from_slice(&client_hello);
        transcript.extend_from_slice(&server_hello);
        let h2 = hash(&transcript);

        let chts = expand(&handshake_secret, b"c hs traffic", &h2);
        let shts = expand(&handshake_secret, b"s hs traffic", &h2);

        let mut flight = Vec::new();
        let encrypted_extensions =
            HandshakeMessage::encode(HandshakeType::EncryptedExtensions, &[0x00, 0x00]);
        flight.push(encrypted_extensions);
        if self.certificate_request {
            flight.push(HandshakeMessage::encode(
                HandshakeType::CertificateRequest,
                &[0x00, 0x00, 0x08, 0x00, 0x0d, 0x00, 0x04, 0x00, 0x02, 0x08, 0x07],
            ));
        }
        flight.push(HandshakeMessage::encode(
            HandshakeType::Certificate,
            &certificate(),
        ));
        flight.iter().for_each(|msg| transcript.extend_from_slice(msg));
        let certificate_hash = hash(&transcript);

        let key = Ed25519KeyPair::from_pkcs8_maybe_unchecked(EE_KEY).unwrap();
        let signature = key.sign(&construct_tls13_server_verify_message(&certificate_hash));
        let mut certificate_verify = vec![0x08, 0x07];
        certificate_verify.extend_from_slice(&(signature.as_ref().len() as u16).to_be_bytes());
        certificate_verify.extend_from_slice(signature.as_ref());
        let certificate_verify =
            HandshakeMessage::encode(HandshakeType::CertificateVerify, &certificate_verify);
        transcript.extend_from_slice(&certificate_verify);
        flight.push(certificate_verify);
        let certificate_verify_hash = hash(&transcript);

        let server_finished_key = expand_len(&shts, b"finished", &[], 32);
        let server_finished = hmac_sha256(&server_finished_key, &certificate_verify_hash)
            .unwrap()
            .to_vec();
        let finished = HandshakeMessage::encode(HandshakeType::Finished, &server_finished);
        transcript.extend_from_slice(&finished);
        flight.push(finished);
        let server_finished_hash = hash(&transcript);

        let derived_handshake = expand(&handshake_secret, b"derived", &empty_hash);
        let master_secret = hkdf_extract(&derived_handshake, &zeros).unwrap();
        let cats = expand(&master_secret, b"c ap traffic", &server_finished_hash);
        let sats = expand(&master_secret, b"s ap traffic", &server_finished_hash);

        // Server stream.
        let mut server_capture = OpaqueRecord::new(ContentType::Handshake, server_hello).encode();
        server_capture.extend(OpaqueRecord::new(ContentType::ChangeCipherSpec, vec![1]).encode());

        let flight = flight.concat();
        let chunks: Vec<&[u8]> = if self.split_flight {
            flight.chunks(97).collect()
        } else {
            vec![flight.as_slice()]
        };
        let mut state = CipherState::from_traffic_secret(&shts).unwrap();
        for chunk in chunks {
            let (next, record) = encrypt_record(state, ContentType::Handshake, chunk).unwrap();
            state = next;
            server_capture.extend(record.encode());
        }

        let mut state = CipherState::from_traffic_secret(&sats).unwrap();
        if self.new_session_ticket {
            let ticket = HandshakeMessage::encode(HandshakeType::NewSessionTicket, &[0x5e; 24]);
            let (next, record) = encrypt_record(state, ContentType::Handshake, &ticket).unwrap();
            state = next;
            server_capture.extend(record.encode());
        }
        for response in &self.response {
            let (next, record) =
                encrypt_record(state, ContentType::ApplicationData, response).unwrap();
            state = next;
            server_capture.extend(record.encode());
        }
        if self.close_notify {
            let (_, record) = encrypt_record(state, ContentType::Alert, &[0x01, 0x00]).unwrap();
            server_capture.extend(record.encode());
        }

        // Client stream.
        let mut client_capture = OpaqueRecord::new(ContentType::Handshake, client_hello).encode();
        client_capture.extend(OpaqueRecord::new(ContentType::ChangeCipherSpec, vec![1]).encode());

        let mut state = CipherState::from_traffic_secret(&chts).unwrap();
        if self.client_certificate {
            let certificate =
                HandshakeMessage::encode(HandshakeType::Certificate, &[0x00, 0x00, 0x00, 0x00]);
            transcript.extend_from_slice(&certificate);
            let (next, record) =
                encrypt_record(state, ContentType::Handshake, &certificate).unwrap();
            state = next;
            client_capture.extend(record.encode());
        }

        let client_finished_key = expand_len(&chts, b"finished", &[], 32);
        let client_finished = HandshakeMessage::encode(
            HandshakeType::Finished,
            &hmac_sha256(&client_finished_key, &hash(&transcript)).unwrap(),
        );
        let (_, record) = encrypt_record(state, ContentType::Handshake, &client_finished).unwrap();
        client_capture.extend(record.encode());

        let state = CipherState::from_traffic_secret(&cats).unwrap();
        let (_, record) =
            encrypt_record(state, ContentType::ApplicationData, &self.request).unwrap();
        client_capture.extend(record.encode());

        SessionFixture {
            client_capture,
            server_capture,
            secrets: SessionSecrets {
                handshake_secret,
                client_handshake_traffic_secret: chts,
                server_handshake_traffic_secret: shts,
                master_secret,
                client_application_traffic_secret: cats,
                server_application_traffic_secret: sats,
            },
            server_finished,
            certificate_hash,
            certificate_verify_hash,
            server_finished_hash,
        }
    }
}

fn hash(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

fn expand(secret: &[u8], label: &[u8], ctx: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&expand_len(secret, label, ctx, 32));
    out
}

fn expand_len(secret: &[u8], label: &[u8], ctx: &[u8], len: usize) -> Vec<u8> {
    hkdf_expand_label(secret, label, ctx, len).unwrap()
}

fn client_hello() -> Vec<u8> {
    let mut body = vec![0x03, 0x03];
    body.extend_from_slice(&[0xc1; 32]);
    body.push(32);
    body.extend_from_slice(&[0x5e; 32]);
    body.extend_from_slice(&[0x00, 0x02, 0x13, 0x01]);
    body.extend_from_slice(&[0x01, 0x00]);

    let name = SERVER_NAME.as_bytes();
    let mut extensions = Vec::new();
    // server_name
    extensions.extend_from_slice(&[0x00, 0x00]);
    extensions.extend_from_slice(&((name.len() + 5) as u16).to_be_bytes());
    extensions.extend_from_slice(&((name.len() + 3) as u16).to_be_bytes());
    extensions.push(0x00);
    extensions.extend_from_slice(&(name.len() as u16).to_be_bytes());
    extensions.extend_from_slice(name);
    // supported_versions
    extensions.extend_from_slice(&[0x00, 0x2b, 0x00, 0x03, 0x02, 0x03, 0x04]);

    body.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
    body.extend_from_slice(&extensions);
    body
}

fn server_hello() -> Vec<u8> {
    let mut body = vec![0x03, 0x03];
    body.extend_from_slice(&[0x5a; 32]);
    body.push(32);
    body.extend_from_slice(&[0x5e; 32]);
    body.extend_from_slice(&[0x13, 0x01, 0x00]);

    let mut extensions = vec![0x00, 0x2b, 0x00, 0x02, 0x03, 0x04];
    // key_share, x25519
    extensions.extend_from_slice(&[0x00, 0x33, 0x00, 0x24, 0x00, 0x1d, 0x00, 0x20]);
    extensions.extend_from_slice(&[0x22; 32]);

    body.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
    body.extend_from_slice(&extensions);
    body
}

fn certificate() -> Vec<u8> {
    let mut entry = Vec::new();
    entry.extend_from_slice(&(EE_DER.len() as u32).to_be_bytes()[1..]);
    entry.extend_from_slice(EE_DER);
    entry.extend_from_slice(&[0x00, 0x00]);

    let mut body = vec![0x00];
    body.extend_from_slice(&(entry.len() as u32).to_be_bytes()[1..]);
    body.extend_from_slice(&entry);
    body
}
