use std::fmt::Display;

use tls_core::TlsError;

/// Replay and extraction error.
///
/// Errors are categorized by kind:
///
/// - **Framing** ([`is_framing`](Self::is_framing)): a record or handshake
///   message is truncated, oversized or malformed.
/// - **Authentication** ([`is_authentication`](Self::is_authentication)): an
///   AEAD tag, a recomputed GCM tag, the server Finished message or the
///   certificate chain did not verify. The capture is corrupted or was
///   tampered with.
/// - **Protocol** ([`is_protocol`](Self::is_protocol)): a handshake message
///   arrived out of order or the server negotiated something unsupported.
/// - **Policy** ([`is_policy`](Self::is_policy)): the policy is unsupported
///   or cannot be satisfied by the session.
/// - **Encoding** ([`is_encoding`](Self::is_encoding)): an interchange file
///   holds malformed JSON or hex.
/// - **IO** ([`is_io`](Self::is_io)): a file could not be read or written.
/// - **Config** ([`is_config`](Self::is_config)): invalid configuration.
///
/// The [`msg`](Self::msg) method returns the stage or sequence number the
/// error occurred at, if available.
#[derive(Debug, thiserror::Error)]
pub struct Error {
    kind: ErrorKind,
    msg: Option<String>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            msg: None,
            source: None,
        }
    }

    pub(crate) fn framing() -> Self {
        Self::new(ErrorKind::Framing)
    }

    pub(crate) fn authentication() -> Self {
        Self::new(ErrorKind::Authentication)
    }

    pub(crate) fn protocol() -> Self {
        Self::new(ErrorKind::Protocol)
    }

    pub(crate) fn policy() -> Self {
        Self::new(ErrorKind::Policy)
    }

    pub(crate) fn encoding() -> Self {
        Self::new(ErrorKind::Encoding)
    }

    pub(crate) fn io() -> Self {
        Self::new(ErrorKind::Io)
    }

    pub(crate) fn config() -> Self {
        Self::new(ErrorKind::Config)
    }

    pub(crate) fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }

    pub(crate) fn with_source<T>(mut self, source: T) -> Self
    where
        T: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.source = Some(source.into());
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns `true` if the error is a framing error.
    pub fn is_framing(&self) -> bool {
        self.kind == ErrorKind::Framing
    }

    /// Returns `true` if the error is an authentication failure.
    pub fn is_authentication(&self) -> bool {
        self.kind == ErrorKind::Authentication
    }

    /// Returns `true` if the error is a handshake sequencing error.
    pub fn is_protocol(&self) -> bool {
        self.kind == ErrorKind::Protocol
    }

    /// Returns `true` if the policy is unsupported or unsatisfiable.
    pub fn is_policy(&self) -> bool {
        self.kind == ErrorKind::Policy
    }

    /// Returns `true` if an interchange file is malformed.
    pub fn is_encoding(&self) -> bool {
        self.kind == ErrorKind::Encoding
    }

    /// Returns `true` if the error originated from an IO error.
    pub fn is_io(&self) -> bool {
        self.kind == ErrorKind::Io
    }

    /// Returns `true` if the error originated from invalid configuration.
    pub fn is_config(&self) -> bool {
        self.kind == ErrorKind::Config
    }

    /// Returns the error message if available.
    pub fn msg(&self) -> Option<&str> {
        self.msg.as_deref()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ErrorKind::Framing => write!(f, "framing error")?,
            ErrorKind::Authentication => {
                write!(f, "authentication error, possible tampering or corrupted capture")?
            }
            ErrorKind::Protocol => write!(f, "protocol error")?,
            ErrorKind::Policy => write!(f, "policy error")?,
            ErrorKind::Encoding => write!(f, "encoding error")?,
            ErrorKind::Io => write!(f, "io error")?,
            ErrorKind::Config => write!(f, "config error")?,
        }

        if let Some(msg) = &self.msg {
            write!(f, ": {msg}")?;
        }

        if let Some(source) = &self.source {
            write!(f, " caused by: {source}")?;
        }

        Ok(())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::io().with_source(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Self::io().with_source(e)
        } else {
            Self::encoding().with_msg("malformed json").with_source(e)
        }
    }
}

impl From<TlsError> for Error {
    fn from(e: TlsError) -> Self {
        let err = if e.is_authentication() {
            Self::authentication()
        } else if e.is_framing() || matches!(e, TlsError::Decode(_)) {
            Self::framing()
        } else if matches!(e, TlsError::RootStore(_)) {
            Self::config()
        } else if matches!(e, TlsError::KeyDerivation(_) | TlsError::Cipher(_)) {
            Self::encoding()
        } else {
            Self::protocol()
        };

        err.with_msg("tls replay").with_source(e)
    }
}

impl From<gcm::GcmError> for Error {
    fn from(e: gcm::GcmError) -> Self {
        match e {
            gcm::GcmError::AuthenticationFailed => Self::authentication().with_source(e),
            _ => Self::encoding().with_msg("invalid gcm input").with_source(e),
        }
    }
}

impl From<hmac_sha256::HashError> for Error {
    fn from(e: hmac_sha256::HashError) -> Self {
        Self::encoding()
            .with_msg("invalid key schedule input")
            .with_source(e)
    }
}

/// Kind of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Truncated, oversized or malformed framing.
    Framing,
    /// Authentication of the session or a record failed.
    Authentication,
    /// Handshake sequencing or negotiation error.
    Protocol,
    /// Unsupported or unsatisfiable policy.
    Policy,
    /// Malformed interchange data.
    Encoding,
    /// File IO failure.
    Io,
    /// Invalid configuration.
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_error_kinds() {
        let err: Error = TlsError::Framing("short header".into()).into();
        assert!(err.is_framing());

        let err: Error = TlsError::Certificate("expired".into()).into();
        assert!(err.is_authentication());

        let err: Error = TlsError::SequenceWrap.into();
        assert!(err.is_protocol());
    }

    #[test]
    fn test_display() {
        let err = Error::policy().with_msg("policy not satisfiable");

        assert_eq!(err.to_string(), "policy error: policy not satisfiable");
        assert_eq!(err.msg(), Some("policy not satisfiable"));
        assert_eq!(err.kind(), ErrorKind::Policy);
    }

    #[test]
    fn test_gcm_authentication() {
        let err: Error = gcm::GcmError::AuthenticationFailed.into();
        assert!(err.is_authentication());

        let err: Error = gcm::GcmError::InvalidKeyLength(3).into();
        assert!(err.is_encoding());
    }
}
