//! Transcript hash checkpoints.

use sha2::{Digest, Sha256};
use tls_core::{msgs::handshake::HandshakeMessage, ServerHandshake};

/// Transcript hashes at the points the TLS 1.3 key schedule consumes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoints {
    /// Hash of the empty transcript, the context of every `"derived"` label.
    pub h0: [u8; 32],
    /// `ClientHello..ServerHello`, context of the handshake traffic secrets.
    pub h2: [u8; 32],
    /// `ClientHello..server Finished`, context of the application traffic
    /// secrets.
    pub h3: [u8; 32],
    /// `ClientHello..CertificateVerify`, the message the server Finished
    /// MACs.
    pub h7: [u8; 32],
}

impl Checkpoints {
    /// Computes the checkpoints of a replayed handshake.
    ///
    /// A CertificateRequest is part of the transcript if the server sent one.
    pub fn from_handshake(handshake: &ServerHandshake) -> Self {
        let mut transcript = Sha256::new();

        let h0 = transcript.clone().finalize().into();

        update(&mut transcript, &handshake.client_hello);
        update(&mut transcript, &handshake.server_hello);
        let h2 = transcript.clone().finalize().into();

        update(&mut transcript, &handshake.encrypted_extensions);
        if let Some(certificate_request) = &handshake.certificate_request {
            update(&mut transcript, certificate_request);
        }
        update(&mut transcript, &handshake.certificate);
        update(&mut transcript, &handshake.certificate_verify);
        let h7 = transcript.clone().finalize().into();

        update(&mut transcript, &handshake.finished);
        let h3 = transcript.finalize().into();

        Self { h0, h2, h3, h7 }
    }
}

fn update(transcript: &mut Sha256, msg: &HandshakeMessage) {
    transcript.update(msg.encoding());
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use tls_core::{cipher::CipherState, fixtures::SessionFixture, HandshakeReplay};

    fn replay(fixture: &SessionFixture) -> ServerHandshake {
        let keys =
            CipherState::from_traffic_secret(&fixture.secrets.server_handshake_traffic_secret)
                .unwrap();
        HandshakeReplay::new(&fixture.client_capture, &fixture.server_capture)
            .unwrap()
            .finish(keys, None)
            .unwrap()
    }

    #[rstest]
    #[case::default(SessionFixture::new())]
    #[case::certificate_request(SessionFixture::builder().certificate_request().build())]
    fn test_checkpoints(#[case] fixture: SessionFixture) {
        let checkpoints = Checkpoints::from_handshake(&replay(&fixture));

        assert_eq!(
            hex::encode(checkpoints.h0),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(checkpoints.h7, fixture.certificate_verify_hash);
        assert_eq!(checkpoints.h3, fixture.server_finished_hash);
    }

    #[test]
    fn test_h2_matches_replay_transcript() {
        let fixture = SessionFixture::new();
        let replay_start =
            HandshakeReplay::new(&fixture.client_capture, &fixture.server_capture).unwrap();
        let h2 = replay_start.transcript().current_hash();

        assert_eq!(Checkpoints::from_handshake(&replay(&fixture)).h2, h2);
    }
}
