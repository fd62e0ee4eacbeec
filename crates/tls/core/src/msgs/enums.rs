//! Protocol enumerations.

/// `legacy_record_version` and `legacy_version` value used by TLS 1.3.
pub const TLS12_VERSION: u16 = 0x0303;
/// TLS 1.3 as carried in the `supported_versions` extension.
pub const TLS13_VERSION: u16 = 0x0304;
/// `TLS_AES_128_GCM_SHA256`.
pub const TLS13_AES_128_GCM_SHA256: u16 = 0x1301;

/// Record content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// `change_cipher_spec`, a no-op in TLS 1.3.
    ChangeCipherSpec,
    /// `alert`.
    Alert,
    /// `handshake`.
    Handshake,
    /// `application_data`.
    ApplicationData,
    /// Any other value.
    Unknown(u8),
}

impl ContentType {
    /// Returns the wire value.
    pub fn get_u8(&self) -> u8 {
        match self {
            Self::ChangeCipherSpec => 20,
            Self::Alert => 21,
            Self::Handshake => 22,
            Self::ApplicationData => 23,
            Self::Unknown(v) => *v,
        }
    }
}

impl From<u8> for ContentType {
    fn from(v: u8) -> Self {
        match v {
            20 => Self::ChangeCipherSpec,
            21 => Self::Alert,
            22 => Self::Handshake,
            23 => Self::ApplicationData,
            v => Self::Unknown(v),
        }
    }
}

/// Handshake message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeType {
    /// `client_hello`.
    ClientHello,
    /// `server_hello`.
    ServerHello,
    /// `new_session_ticket`.
    NewSessionTicket,
    /// `encrypted_extensions`.
    EncryptedExtensions,
    /// `certificate`.
    Certificate,
    /// `certificate_request`.
    CertificateRequest,
    /// `certificate_verify`.
    CertificateVerify,
    /// `finished`.
    Finished,
    /// `key_update`.
    KeyUpdate,
    /// Any other value.
    Unknown(u8),
}

impl HandshakeType {
    /// Returns the wire value.
    pub fn get_u8(&self) -> u8 {
        match self {
            Self::ClientHello => 1,
            Self::ServerHello => 2,
            Self::NewSessionTicket => 4,
            Self::EncryptedExtensions => 8,
            Self::Certificate => 11,
            Self::CertificateRequest => 13,
            Self::CertificateVerify => 15,
            Self::Finished => 20,
            Self::KeyUpdate => 24,
            Self::Unknown(v) => *v,
        }
    }
}

impl From<u8> for HandshakeType {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::ClientHello,
            2 => Self::ServerHello,
            4 => Self::NewSessionTicket,
            8 => Self::EncryptedExtensions,
            11 => Self::Certificate,
            13 => Self::CertificateRequest,
            15 => Self::CertificateVerify,
            20 => Self::Finished,
            24 => Self::KeyUpdate,
            v => Self::Unknown(v),
        }
    }
}

/// Extension type values used during replay.
pub mod extension {
    /// `server_name`.
    pub const SERVER_NAME: u16 = 0;
    /// `supported_versions`.
    pub const SUPPORTED_VERSIONS: u16 = 43;
}

/// Signature scheme of a CertificateVerify message.
#[allow(non_camel_case_types, missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    RSA_PKCS1_SHA1,
    ECDSA_SHA1_Legacy,
    RSA_PKCS1_SHA256,
    ECDSA_NISTP256_SHA256,
    RSA_PKCS1_SHA384,
    ECDSA_NISTP384_SHA384,
    RSA_PKCS1_SHA512,
    ECDSA_NISTP521_SHA512,
    RSA_PSS_SHA256,
    RSA_PSS_SHA384,
    RSA_PSS_SHA512,
    ED25519,
    ED448,
    Unknown(u16),
}

impl SignatureScheme {
    /// Returns the wire value.
    pub fn get_u16(&self) -> u16 {
        match self {
            Self::RSA_PKCS1_SHA1 => 0x0201,
            Self::ECDSA_SHA1_Legacy => 0x0203,
            Self::RSA_PKCS1_SHA256 => 0x0401,
            Self::ECDSA_NISTP256_SHA256 => 0x0403,
            Self::RSA_PKCS1_SHA384 => 0x0501,
            Self::ECDSA_NISTP384_SHA384 => 0x0503,
            Self::RSA_PKCS1_SHA512 => 0x0601,
            Self::ECDSA_NISTP521_SHA512 => 0x0603,
            Self::RSA_PSS_SHA256 => 0x0804,
            Self::RSA_PSS_SHA384 => 0x0805,
            Self::RSA_PSS_SHA512 => 0x0806,
            Self::ED25519 => 0x0807,
            Self::ED448 => 0x0808,
            Self::Unknown(v) => *v,
        }
    }

    /// Returns `true` for PKCS#1 v1.5 and SHA-1 schemes, which TLS 1.3
    /// forbids in CertificateVerify.
    pub fn is_legacy(&self) -> bool {
        matches!(
            self,
            Self::RSA_PKCS1_SHA1
                | Self::ECDSA_SHA1_Legacy
                | Self::RSA_PKCS1_SHA256
                | Self::RSA_PKCS1_SHA384
                | Self::RSA_PKCS1_SHA512
        )
    }
}

impl From<u16> for SignatureScheme {
    fn from(v: u16) -> Self {
        match v {
            0x0201 => Self::RSA_PKCS1_SHA1,
            0x0203 => Self::ECDSA_SHA1_Legacy,
            0x0401 => Self::RSA_PKCS1_SHA256,
            0x0403 => Self::ECDSA_NISTP256_SHA256,
            0x0501 => Self::RSA_PKCS1_SHA384,
            0x0503 => Self::ECDSA_NISTP384_SHA384,
            0x0601 => Self::RSA_PKCS1_SHA512,
            0x0603 => Self::ECDSA_NISTP521_SHA512,
            0x0804 => Self::RSA_PSS_SHA256,
            0x0805 => Self::RSA_PSS_SHA384,
            0x0806 => Self::RSA_PSS_SHA512,
            0x0807 => Self::ED25519,
            0x0808 => Self::ED448,
            v => Self::Unknown(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_round_trip() {
        for v in 0..=255u8 {
            assert_eq!(ContentType::from(v).get_u8(), v);
            assert_eq!(HandshakeType::from(v).get_u8(), v);
        }
    }

    #[test]
    fn test_legacy_schemes() {
        assert!(SignatureScheme::from(0x0401).is_legacy());
        assert!(SignatureScheme::from(0x0201).is_legacy());
        assert!(!SignatureScheme::from(0x0807).is_legacy());
        assert!(!SignatureScheme::from(0x0804).is_legacy());
    }
}
