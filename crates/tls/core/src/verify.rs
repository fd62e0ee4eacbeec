//! Server authentication.

use web_time::{SystemTime, UNIX_EPOCH};

use crate::{
    anchors::RootCertStore,
    msgs::{enums::SignatureScheme, handshake::DigitallySigned},
    TlsError,
};

type SignatureAlgorithms = &'static [&'static webpki::SignatureAlgorithm];

/// Algorithms accepted for signatures within the certificate chain.
static SUPPORTED_SIG_ALGS: SignatureAlgorithms = &[
    &webpki::ECDSA_P256_SHA256,
    &webpki::ECDSA_P256_SHA384,
    &webpki::ECDSA_P384_SHA256,
    &webpki::ECDSA_P384_SHA384,
    &webpki::ED25519,
    &webpki::RSA_PSS_2048_8192_SHA256_LEGACY_KEY,
    &webpki::RSA_PSS_2048_8192_SHA384_LEGACY_KEY,
    &webpki::RSA_PSS_2048_8192_SHA512_LEGACY_KEY,
    &webpki::RSA_PKCS1_2048_8192_SHA256,
    &webpki::RSA_PKCS1_2048_8192_SHA384,
    &webpki::RSA_PKCS1_2048_8192_SHA512,
    &webpki::RSA_PKCS1_3072_8192_SHA384,
];

/// Verifies the server's certificate chain and its CertificateVerify
/// signature.
pub trait ServerCertVerifier {
    /// Verifies the chain `end_entity` + `intermediates`, and that it is valid
    /// for `server_name` when one was sent in the ClientHello.
    fn verify_server_cert(
        &self,
        end_entity: &[u8],
        intermediates: &[&[u8]],
        server_name: Option<&str>,
    ) -> Result<(), TlsError>;

    /// Verifies `dss` over `message` with the end entity's public key.
    fn verify_tls13_signature(
        &self,
        message: &[u8],
        end_entity: &[u8],
        dss: &DigitallySigned,
    ) -> Result<(), TlsError>;
}

/// [`ServerCertVerifier`] backed by `webpki`.
#[derive(Debug, Clone)]
pub struct WebPkiVerifier {
    roots: RootCertStore,
    time: Option<u64>,
}

impl WebPkiVerifier {
    /// Creates a verifier trusting `roots`, checking validity at the current
    /// time.
    pub fn new(roots: RootCertStore) -> Self {
        Self { roots, time: None }
    }

    /// Checks validity at `unix_seconds` instead of the current time.
    pub fn with_time(mut self, unix_seconds: u64) -> Self {
        self.time = Some(unix_seconds);
        self
    }

    fn now(&self) -> Result<webpki::Time, TlsError> {
        let secs = match self.time {
            Some(secs) => secs,
            None => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(|_| TlsError::Certificate("system time before unix epoch".into()))?
                .as_secs(),
        };
        Ok(webpki::Time::from_seconds_since_unix_epoch(secs))
    }
}

impl ServerCertVerifier for WebPkiVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &[u8],
        intermediates: &[&[u8]],
        server_name: Option<&str>,
    ) -> Result<(), TlsError> {
        let cert = webpki::EndEntityCert::try_from(end_entity).map_err(pki_error)?;
        let anchors = self.roots.trust_anchors();

        cert.verify_is_valid_tls_server_cert(
            SUPPORTED_SIG_ALGS,
            &webpki::TlsServerTrustAnchors(&anchors),
            intermediates,
            self.now()?,
        )
        .map_err(pki_error)?;

        if let Some(name) = server_name {
            let dns_name = webpki::DnsNameRef::try_from_ascii_str(name)
                .map_err(|_| TlsError::Certificate(format!("invalid server name {name:?}")))?;
            cert.verify_is_valid_for_dns_name(dns_name)
                .map_err(pki_error)?;
        }

        Ok(())
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        end_entity: &[u8],
        dss: &DigitallySigned,
    ) -> Result<(), TlsError> {
        let alg = convert_scheme(dss.scheme)?;
        let cert = webpki::EndEntityCert::try_from(end_entity).map_err(pki_error)?;

        cert.verify_signature(alg, message, &dss.sig)
            .map_err(pki_error)
    }
}

fn pki_error(err: webpki::Error) -> TlsError {
    TlsError::Certificate(err.to_string())
}

/// Maps a TLS 1.3 CertificateVerify scheme to a `webpki` algorithm.
///
/// Legacy schemes are rejected.
pub fn convert_scheme(
    scheme: SignatureScheme,
) -> Result<&'static webpki::SignatureAlgorithm, TlsError> {
    match scheme {
        SignatureScheme::ECDSA_NISTP256_SHA256 => Ok(&webpki::ECDSA_P256_SHA256),
        SignatureScheme::ECDSA_NISTP384_SHA384 => Ok(&webpki::ECDSA_P384_SHA384),
        SignatureScheme::ED25519 => Ok(&webpki::ED25519),
        SignatureScheme::RSA_PSS_SHA256 => Ok(&webpki::RSA_PSS_2048_8192_SHA256_LEGACY_KEY),
        SignatureScheme::RSA_PSS_SHA384 => Ok(&webpki::RSA_PSS_2048_8192_SHA384_LEGACY_KEY),
        SignatureScheme::RSA_PSS_SHA512 => Ok(&webpki::RSA_PSS_2048_8192_SHA512_LEGACY_KEY),
        other => Err(TlsError::SignatureScheme(other.get_u16())),
    }
}

/// Builds the content covered by the server's CertificateVerify signature.
pub fn construct_tls13_server_verify_message(handshake_hash: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(64 + 34 + handshake_hash.len());
    msg.resize(64, 0x20u8);
    msg.extend_from_slice(b"TLS 1.3, server CertificateVerify\x00");
    msg.extend_from_slice(handshake_hash);
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring::signature::{Ed25519KeyPair, KeyPair};
    use rstest::*;

    const CA: &[u8] = include_bytes!("../testdata/ca.der");
    const EE: &[u8] = include_bytes!("../testdata/ee.der");
    const EE_KEY: &[u8] = include_bytes!("../testdata/ee.key.der");
    // A day after the test chain was issued.
    const TIME: u64 = 1_792_260_000;
    // Before the test chain was issued.
    const BAD_TIME: u64 = 1_700_000_000;

    fn verifier(time: u64) -> WebPkiVerifier {
        let mut roots = RootCertStore::empty();
        roots.add(CA).unwrap();
        WebPkiVerifier::new(roots).with_time(time)
    }

    #[test]
    fn test_verify_chain() {
        verifier(TIME)
            .verify_server_cert(EE, &[], Some("api.example.com"))
            .unwrap();
    }

    #[test]
    fn test_verify_chain_wrong_name() {
        let err = verifier(TIME)
            .verify_server_cert(EE, &[], Some("other.example.com"))
            .unwrap_err();

        assert!(err.is_authentication());
    }

    #[test]
    fn test_verify_chain_bad_time() {
        assert!(verifier(BAD_TIME)
            .verify_server_cert(EE, &[], None)
            .is_err());
    }

    #[test]
    fn test_verify_chain_untrusted() {
        let verifier = WebPkiVerifier::new(RootCertStore::empty()).with_time(TIME);

        assert!(verifier.verify_server_cert(EE, &[], None).is_err());
    }

    #[test]
    fn test_verify_signature() {
        let key = Ed25519KeyPair::from_pkcs8_maybe_unchecked(EE_KEY).unwrap();
        let message = construct_tls13_server_verify_message(&[7u8; 32]);
        let dss = DigitallySigned {
            scheme: SignatureScheme::ED25519,
            sig: key.sign(&message).as_ref().to_vec(),
        };

        verifier(TIME)
            .verify_tls13_signature(&message, EE, &dss)
            .unwrap();

        let mut tampered = message.clone();
        tampered[100] ^= 1;
        assert!(verifier(TIME)
            .verify_tls13_signature(&tampered, EE, &dss)
            .is_err());
        assert_eq!(key.public_key().as_ref().len(), 32);
    }

    #[rstest]
    #[case::pkcs1_sha256(0x0401)]
    #[case::pkcs1_sha384(0x0501)]
    #[case::pkcs1_sha512(0x0601)]
    #[case::pkcs1_sha1(0x0201)]
    #[case::ecdsa_sha1(0x0203)]
    #[case::unknown(0xfefe)]
    fn test_legacy_schemes_rejected(#[case] scheme: u16) {
        assert!(matches!(
            convert_scheme(SignatureScheme::from(scheme)),
            Err(TlsError::SignatureScheme(s)) if s == scheme
        ));
    }

    #[test]
    fn test_verify_message_layout() {
        let msg = construct_tls13_server_verify_message(&[0xab; 32]);

        assert_eq!(msg.len(), 64 + 34 + 32);
        assert!(msg[..64].iter().all(|&b| b == 0x20));
        assert_eq!(&msg[64..97], b"TLS 1.3, server CertificateVerify");
        assert_eq!(msg[97], 0);
    }
}
