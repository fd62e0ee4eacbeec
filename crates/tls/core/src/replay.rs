//! Handshake replay state machine.

#[cfg(feature = "logging")]
use crate::log::{debug, trace, warn};
use crate::{
    cipher::{decrypt_next_record, CipherState, Epoch},
    hash_hs::HandshakeHash,
    msgs::{
        enums::{ContentType, HandshakeType, TLS13_AES_128_GCM_SHA256, TLS13_VERSION},
        handshake::{HandshakeJoiner, HandshakeMessage, HandshakePayload},
    },
    record::{OpaqueRecord, RecordReader},
    verify::{construct_tls13_server_verify_message, ServerCertVerifier},
    TlsError,
};

/// Alert description of `close_notify`.
const CLOSE_NOTIFY: u8 = 0;

/// Position in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing read yet.
    AwaitingClientHello,
    /// ClientHello read.
    AwaitingServerHello,
    /// Handshake keys installed.
    AwaitingEncryptedExtensions,
    /// EncryptedExtensions read, a CertificateRequest may come first.
    AwaitingCertificateChain,
    /// Certificate read.
    AwaitingCertificateVerify,
    /// CertificateVerify read.
    AwaitingFinished,
    /// Server Finished read.
    ApplicationDataReady,
}

impl HandshakeState {
    /// Message types acceptable in this state.
    pub fn expected(&self) -> &'static [HandshakeType] {
        match self {
            Self::AwaitingClientHello => &[HandshakeType::ClientHello],
            Self::AwaitingServerHello => &[HandshakeType::ServerHello],
            Self::AwaitingEncryptedExtensions => &[HandshakeType::EncryptedExtensions],
            Self::AwaitingCertificateChain => {
                &[HandshakeType::CertificateRequest, HandshakeType::Certificate]
            }
            Self::AwaitingCertificateVerify => &[HandshakeType::CertificateVerify],
            Self::AwaitingFinished => &[HandshakeType::Finished],
            Self::ApplicationDataReady => &[],
        }
    }

    fn check(&self, msg: &HandshakeMessage) -> Result<(), TlsError> {
        if self.expected().contains(&msg.typ) {
            Ok(())
        } else {
            Err(TlsError::UnexpectedMessage {
                expected: self.expected(),
                got: msg.typ,
            })
        }
    }
}

fn alert(payload: &[u8]) -> TlsError {
    match payload {
        [level, description] => TlsError::Alert {
            level: *level,
            description: *description,
        },
        _ => TlsError::decode(format!("alert of {} bytes", payload.len())),
    }
}

/// Reads the next plaintext handshake message.
fn next_plain_message(
    reader: &mut RecordReader<'_>,
    joiner: &mut HandshakeJoiner,
    awaiting: &'static str,
) -> Result<HandshakeMessage, TlsError> {
    loop {
        if let Some(msg) = joiner.pop()? {
            return Ok(msg);
        }

        let record = reader.read()?.ok_or(TlsError::UnexpectedEof(awaiting))?;
        match record.typ {
            ContentType::Handshake => joiner.push(&record.payload),
            ContentType::ChangeCipherSpec => trace!("skipping change_cipher_spec"),
            ContentType::Alert => return Err(alert(&record.payload)),
            got => {
                return Err(TlsError::UnexpectedContent {
                    expected: ContentType::Handshake,
                    got,
                })
            }
        }
    }
}

/// Reads the next protected handshake message.
fn next_protected_message(
    reader: &mut RecordReader<'_>,
    joiner: &mut HandshakeJoiner,
    mut epoch: Epoch,
    awaiting: &'static str,
) -> Result<(Epoch, HandshakeMessage), TlsError> {
    loop {
        if let Some(msg) = joiner.pop()? {
            return Ok((epoch, msg));
        }

        let record = reader.read()?.ok_or(TlsError::UnexpectedEof(awaiting))?;
        if record.typ == ContentType::ChangeCipherSpec {
            trace!("skipping change_cipher_spec");
            continue;
        }

        let (next, plain) = decrypt_next_record(epoch, &record)?;
        epoch = next;
        match plain.typ {
            ContentType::Handshake => joiner.push(&plain.payload),
            ContentType::Alert => return Err(alert(&plain.payload)),
            got => {
                return Err(TlsError::UnexpectedContent {
                    expected: ContentType::Handshake,
                    got,
                })
            }
        }
    }
}

fn remaining_records(reader: &mut RecordReader<'_>) -> Result<Vec<OpaqueRecord>, TlsError> {
    let mut records = Vec::new();
    while let Some(record) = reader.read()? {
        if record.typ != ContentType::ChangeCipherSpec {
            records.push(record);
        }
    }
    Ok(records)
}

/// Replays the handshake of a captured session.
///
/// Construction reads the ClientHello and ServerHello, after which
/// [`HandshakeReplay::transcript`] holds `ClientHello || ServerHello`, the
/// input to the handshake traffic secret derivation. The protected part of
/// the server flight is read by [`HandshakeReplay::finish`].
#[derive(Debug)]
pub struct HandshakeReplay<'a> {
    client: RecordReader<'a>,
    server: RecordReader<'a>,
    state: HandshakeState,
    transcript: HandshakeHash,
    client_hello: HandshakeMessage,
    server_hello: HandshakeMessage,
}

impl<'a> HandshakeReplay<'a> {
    /// Starts a replay over the bytes sent by the client and by the server.
    pub fn new(client_capture: &'a [u8], server_capture: &'a [u8]) -> Result<Self, TlsError> {
        let mut client = RecordReader::new(client_capture);
        let mut server = RecordReader::new(server_capture);
        let mut transcript = HandshakeHash::new();

        let mut state = HandshakeState::AwaitingClientHello;
        let mut joiner = HandshakeJoiner::new();
        let client_hello = next_plain_message(&mut client, &mut joiner, "ClientHello")?;
        state.check(&client_hello)?;
        if !joiner.is_empty() {
            return Err(TlsError::framing("trailing handshake data after ClientHello"));
        }
        transcript.add_message(&client_hello);
        state = HandshakeState::AwaitingServerHello;
        debug!("replayed ClientHello");

        let server_hello = next_plain_message(&mut server, &mut joiner, "ServerHello")?;
        state.check(&server_hello)?;
        check_server_hello(&server_hello)?;
        if !joiner.is_empty() {
            return Err(TlsError::framing("handshake data spans key change"));
        }
        transcript.add_message(&server_hello);
        state = HandshakeState::AwaitingEncryptedExtensions;
        debug!("replayed ServerHello");

        Ok(Self {
            client,
            server,
            state,
            transcript,
            client_hello,
            server_hello,
        })
    }

    /// Returns the current state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Returns the transcript read so far.
    pub fn transcript(&self) -> &HandshakeHash {
        &self.transcript
    }

    /// Returns the ClientHello.
    pub fn client_hello(&self) -> &HandshakeMessage {
        &self.client_hello
    }

    /// Returns the ServerHello.
    pub fn server_hello(&self) -> &HandshakeMessage {
        &self.server_hello
    }

    /// Decrypts the rest of the server flight with the server handshake
    /// traffic keys.
    ///
    /// When a `verifier` is supplied the certificate chain and the
    /// CertificateVerify signature are checked.
    pub fn finish(
        mut self,
        handshake_keys: CipherState,
        verifier: Option<&dyn ServerCertVerifier>,
    ) -> Result<ServerHandshake, TlsError> {
        let server_name = server_name(&self.client_hello);
        let mut joiner = HandshakeJoiner::new();
        let mut epoch = Epoch::Protected(handshake_keys);

        let mut encrypted_extensions = None;
        let mut certificate_request = None;
        let mut certificate = None;
        let mut certificate_verify = None;
        let mut finished = None;
        let mut end_entity = Vec::new();

        while self.state != HandshakeState::ApplicationDataReady {
            let (next, msg) =
                next_protected_message(&mut self.server, &mut joiner, epoch, "server handshake")?;
            epoch = next;
            self.state.check(&msg)?;

            self.state = match &msg.payload {
                HandshakePayload::EncryptedExtensions(_) => {
                    self.transcript.add_message(&msg);
                    encrypted_extensions = Some(msg);
                    HandshakeState::AwaitingCertificateChain
                }
                HandshakePayload::CertificateRequest(_) => {
                    if certificate_request.is_some() {
                        return Err(TlsError::UnexpectedMessage {
                            expected: &[HandshakeType::Certificate],
                            got: msg.typ,
                        });
                    }
                    self.transcript.add_message(&msg);
                    certificate_request = Some(msg);
                    HandshakeState::AwaitingCertificateChain
                }
                HandshakePayload::Certificate(payload) => {
                    end_entity = payload
                        .end_entity()
                        .ok_or_else(|| TlsError::Certificate("empty certificate chain".into()))?
                        .to_vec();
                    if let Some(verifier) = verifier {
                        verifier.verify_server_cert(
                            &end_entity,
                            &payload.intermediates(),
                            server_name.as_deref(),
                        )?;
                        debug!("server certificate chain verified");
                    }
                    self.transcript.add_message(&msg);
                    certificate = Some(msg);
                    HandshakeState::AwaitingCertificateVerify
                }
                HandshakePayload::CertificateVerify(dss) => {
                    if dss.scheme.is_legacy() {
                        return Err(TlsError::SignatureScheme(dss.scheme.get_u16()));
                    }
                    if let Some(verifier) = verifier {
                        let message =
                            construct_tls13_server_verify_message(&self.transcript.current_hash());
                        verifier.verify_tls13_signature(&message, &end_entity, dss)?;
                        debug!("server CertificateVerify verified");
                    }
                    self.transcript.add_message(&msg);
                    certificate_verify = Some(msg);
                    HandshakeState::AwaitingFinished
                }
                HandshakePayload::Finished(_) => {
                    self.transcript.add_message(&msg);
                    finished = Some(msg);
                    HandshakeState::ApplicationDataReady
                }
                _ => {
                    return Err(TlsError::UnexpectedMessage {
                        expected: self.state.expected(),
                        got: msg.typ,
                    })
                }
            };
            debug!("replay state {:?}", self.state);
        }

        if !joiner.is_empty() {
            return Err(TlsError::framing("handshake data spans key change"));
        }

        let missing = |what: &'static str| TlsError::UnexpectedEof(what);
        let server_records = remaining_records(&mut self.server)?;
        let client_records = remaining_records(&mut self.client)?;
        debug!(
            "handshake replayed, {} server and {} client records follow",
            server_records.len(),
            client_records.len()
        );

        Ok(ServerHandshake {
            client_hello: self.client_hello,
            server_hello: self.server_hello,
            encrypted_extensions: encrypted_extensions.ok_or_else(|| missing("EncryptedExtensions"))?,
            certificate_request,
            certificate: certificate.ok_or_else(|| missing("Certificate"))?,
            certificate_verify: certificate_verify.ok_or_else(|| missing("CertificateVerify"))?,
            finished: finished.ok_or_else(|| missing("Finished"))?,
            server_name,
            server_records,
            client_records,
        })
    }
}

fn check_server_hello(msg: &HandshakeMessage) -> Result<(), TlsError> {
    let HandshakePayload::ServerHello(sh) = &msg.payload else {
        return Err(TlsError::UnexpectedMessage {
            expected: &[HandshakeType::ServerHello],
            got: msg.typ,
        });
    };

    if sh.is_hello_retry_request() {
        return Err(TlsError::PeerMisbehaved(
            "HelloRetryRequest is not supported".into(),
        ));
    }
    match sh.supported_version() {
        Some(TLS13_VERSION) => {}
        other => {
            return Err(TlsError::PeerMisbehaved(format!(
                "server selected version {other:?}, expected TLS 1.3"
            )))
        }
    }
    if sh.cipher_suite != TLS13_AES_128_GCM_SHA256 {
        return Err(TlsError::PeerMisbehaved(format!(
            "server selected cipher suite {:#06x}",
            sh.cipher_suite
        )));
    }

    Ok(())
}

fn server_name(client_hello: &HandshakeMessage) -> Option<String> {
    match &client_hello.payload {
        HandshakePayload::ClientHello(ch) => ch.server_name(),
        _ => None,
    }
}

/// A replayed server handshake flight and the records that follow it.
#[derive(Debug, Clone)]
pub struct ServerHandshake {
    /// ClientHello.
    pub client_hello: HandshakeMessage,
    /// ServerHello.
    pub server_hello: HandshakeMessage,
    /// EncryptedExtensions.
    pub encrypted_extensions: HandshakeMessage,
    /// CertificateRequest, if the server sent one.
    pub certificate_request: Option<HandshakeMessage>,
    /// Certificate.
    pub certificate: HandshakeMessage,
    /// CertificateVerify.
    pub certificate_verify: HandshakeMessage,
    /// Server Finished.
    pub finished: HandshakeMessage,
    /// Host name sent in the ClientHello.
    pub server_name: Option<String>,
    /// Server records after the Finished message, in the application epoch.
    pub server_records: Vec<OpaqueRecord>,
    /// Client records after the ClientHello, change_cipher_spec removed.
    ///
    /// These start with the client's second flight, protected with the
    /// client handshake traffic keys and ending with the client Finished.
    pub client_records: Vec<OpaqueRecord>,
}

impl ServerHandshake {
    /// Returns the server Finished verify data.
    pub fn finished_verify_data(&self) -> &[u8] {
        match &self.finished.payload {
            HandshakePayload::Finished(verify_data) => verify_data,
            _ => &[],
        }
    }

    /// Returns the server handshake messages in transcript order, starting
    /// with the ClientHello.
    pub fn messages(&self) -> Vec<&HandshakeMessage> {
        let mut messages = vec![
            &self.client_hello,
            &self.server_hello,
            &self.encrypted_extensions,
        ];
        messages.extend(self.certificate_request.as_ref());
        messages.extend([
            &self.certificate,
            &self.certificate_verify,
            &self.finished,
        ]);
        messages
    }

    /// Returns the client records protected with the client application
    /// traffic keys.
    ///
    /// The client flight is decrypted with `handshake_keys` up to and
    /// including the client Finished. It may hold a Certificate and a
    /// CertificateVerify when the server requested a certificate.
    pub fn client_application_records(
        &self,
        handshake_keys: CipherState,
    ) -> Result<&[OpaqueRecord], TlsError> {
        let mut joiner = HandshakeJoiner::new();
        let mut epoch = Epoch::Protected(handshake_keys);

        for (idx, record) in self.client_records.iter().enumerate() {
            let (next, plain) = decrypt_next_record(epoch, record)?;
            epoch = next;
            match plain.typ {
                ContentType::Handshake => joiner.push(&plain.payload),
                ContentType::Alert => return Err(alert(&plain.payload)),
                got => {
                    return Err(TlsError::UnexpectedContent {
                        expected: ContentType::Handshake,
                        got,
                    })
                }
            }

            while let Some(msg) = joiner.pop()? {
                trace!("client sent {:?}", msg.typ);
                if let HandshakePayload::Finished(_) = msg.payload {
                    if !joiner.is_empty() {
                        return Err(TlsError::framing("client data follows Finished in record"));
                    }
                    return Ok(&self.client_records[idx + 1..]);
                }
            }
        }

        if !self.client_records.is_empty() {
            warn!("client capture ends before the client Finished");
        }
        Ok(&[])
    }
}

/// An application data record decrypted during replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationRecord {
    /// Sequence number in the application epoch.
    pub seq: u64,
    /// The record as captured.
    pub record: OpaqueRecord,
    /// Decrypted content.
    pub plaintext: Vec<u8>,
}

/// Decrypts application epoch `records` with `keys`.
///
/// Post-handshake messages are skipped but still consume a sequence number,
/// a `close_notify` alert ends the stream.
pub fn decrypt_application_data(
    records: &[OpaqueRecord],
    keys: CipherState,
) -> Result<Vec<ApplicationRecord>, TlsError> {
    let mut epoch = Epoch::Protected(keys);
    let mut out = Vec::new();

    for record in records {
        let seq = epoch.cipher_state().map(CipherState::seq).unwrap_or_default();
        let (next, plain) = decrypt_next_record(epoch, record)?;
        epoch = next;

        match plain.typ {
            ContentType::ApplicationData => out.push(ApplicationRecord {
                seq,
                record: record.clone(),
                plaintext: plain.payload,
            }),
            ContentType::Handshake => {
                debug!("skipping post-handshake message in record {}", seq);
            }
            ContentType::Alert if plain.payload.get(1) == Some(&CLOSE_NOTIFY) => {
                debug!("close_notify in record {}", seq);
                break;
            }
            ContentType::Alert => return Err(alert(&plain.payload)),
            other => {
                warn!("ignoring record {} of type {:?}", seq, other);
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        anchors::RootCertStore,
        fixtures::{self, SessionFixture},
        verify::WebPkiVerifier,
    };
    use rstest::*;

    fn handshake_keys(fixture: &SessionFixture) -> CipherState {
        CipherState::from_traffic_secret(&fixture.secrets.server_handshake_traffic_secret).unwrap()
    }

    fn client_handshake_keys(fixture: &SessionFixture) -> CipherState {
        CipherState::from_traffic_secret(&fixture.secrets.client_handshake_traffic_secret).unwrap()
    }

    fn replay(fixture: &SessionFixture) -> Result<ServerHandshake, TlsError> {
        let verifier = fixtures::verifier();
        HandshakeReplay::new(&fixture.client_capture, &fixture.server_capture)?
            .finish(handshake_keys(fixture), Some(&verifier))
    }

    #[rstest]
    #[case::default(SessionFixture::new())]
    #[case::certificate_request(SessionFixture::builder().certificate_request().build())]
    #[case::client_certificate(SessionFixture::builder().client_certificate().build())]
    #[case::split_flight(SessionFixture::builder().split_flight().build())]
    fn test_replay(#[case] fixture: SessionFixture) {
        let _ = tracing_subscriber::fmt::try_init();

        let hs = replay(&fixture).unwrap();

        assert_eq!(hs.finished_verify_data(), fixture.server_finished.as_slice());
        assert_eq!(hs.server_name.as_deref(), Some(fixtures::SERVER_NAME));
        assert_eq!(hs.server_records.len(), fixtures::RESPONSE.len());
        assert_eq!(
            hs.client_application_records(client_handshake_keys(&fixture))
                .unwrap()
                .len(),
            1
        );

        let transcript: Vec<u8> = hs
            .messages()
            .iter()
            .flat_map(|msg| msg.encoding().to_vec())
            .collect();
        let mut hash = HandshakeHash::new();
        hash.add_raw(&transcript);
        assert_eq!(hash.current_hash(), fixture.server_finished_hash);
    }

    #[test]
    fn test_transcript_after_hellos() {
        let fixture = SessionFixture::new();
        let replay = HandshakeReplay::new(&fixture.client_capture, &fixture.server_capture).unwrap();

        assert_eq!(replay.state(), HandshakeState::AwaitingEncryptedExtensions);
        assert_eq!(
            replay.transcript().buffer(),
            [replay.client_hello().encoding(), replay.server_hello().encoding()].concat()
        );
    }

    #[test]
    fn test_decrypt_application_data() {
        let fixture = SessionFixture::builder()
            .new_session_ticket()
            .close_notify()
            .build();
        let hs = replay(&fixture).unwrap();
        let keys =
            CipherState::from_traffic_secret(&fixture.secrets.server_application_traffic_secret)
                .unwrap();

        let records = decrypt_application_data(&hs.server_records, keys).unwrap();

        assert_eq!(records.len(), fixtures::RESPONSE.len());
        assert_eq!(records[0].seq, 1);
        assert_eq!(records[1].plaintext, fixtures::RESPONSE[1]);
    }

    #[test]
    fn test_client_flight_before_request() {
        let fixture = SessionFixture::builder().client_certificate().build();
        let hs = replay(&fixture).unwrap();
        let keys =
            CipherState::from_traffic_secret(&fixture.secrets.client_application_traffic_secret)
                .unwrap();

        assert_eq!(hs.client_records.len(), 3);

        let records = hs
            .client_application_records(client_handshake_keys(&fixture))
            .unwrap();
        let requests = decrypt_application_data(records, keys).unwrap();

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].seq, 0);
        assert_eq!(requests[0].plaintext, fixtures::REQUEST);
    }

    #[test]
    fn test_client_flight_wrong_keys() {
        let fixture = SessionFixture::builder().client_certificate().build();
        let hs = replay(&fixture).unwrap();

        let err = hs
            .client_application_records(handshake_keys(&fixture))
            .unwrap_err();

        assert!(err.is_authentication());
    }

    #[test]
    fn test_wrong_handshake_keys() {
        let fixture = SessionFixture::new();
        let keys = CipherState::from_traffic_secret(&fixture.secrets.handshake_secret).unwrap();

        let err = HandshakeReplay::new(&fixture.client_capture, &fixture.server_capture)
            .unwrap()
            .finish(keys, None)
            .unwrap_err();

        assert!(matches!(err, TlsError::Decrypt { seq: 0, .. }));
    }

    #[test]
    fn test_untrusted_certificate() {
        let fixture = SessionFixture::new();
        let verifier = WebPkiVerifier::new(RootCertStore::empty()).with_time(fixtures::VERIFICATION_TIME);

        let err = HandshakeReplay::new(&fixture.client_capture, &fixture.server_capture)
            .unwrap()
            .finish(handshake_keys(&fixture), Some(&verifier))
            .unwrap_err();

        assert!(matches!(err, TlsError::Certificate(_)));
    }

    #[test]
    fn test_truncated_server_capture() {
        let fixture = SessionFixture::new();
        let server = &fixture.server_capture[..fixture.server_capture.len() / 2];

        let err = HandshakeReplay::new(&fixture.client_capture, server)
            .unwrap()
            .finish(handshake_keys(&fixture), None)
            .unwrap_err();

        assert!(err.is_framing());
    }

    #[test]
    fn test_tampered_handshake_record() {
        let mut fixture = SessionFixture::new();
        // Flip a byte in the encrypted flight, behind ServerHello and CCS.
        let offset = fixture.server_capture.len() - 400;
        fixture.server_capture[offset] ^= 0x01;

        assert!(replay(&fixture).unwrap_err().is_authentication());
    }

    #[test]
    fn test_server_first_is_rejected() {
        let fixture = SessionFixture::new();

        let err = HandshakeReplay::new(&fixture.server_capture, &fixture.client_capture).unwrap_err();

        assert!(matches!(
            err,
            TlsError::UnexpectedMessage {
                got: HandshakeType::ServerHello,
                ..
            }
        ));
    }

    #[test]
    fn test_state_expectations() {
        assert_eq!(
            HandshakeState::AwaitingCertificateChain.expected(),
            &[HandshakeType::CertificateRequest, HandshakeType::Certificate]
        );
        assert!(HandshakeState::ApplicationDataReady.expected().is_empty());
    }
}
