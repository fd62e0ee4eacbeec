use crate::{
    anchors::RootCertStoreError,
    msgs::enums::{ContentType, HandshakeType},
};

/// Errors that can occur while replaying a captured TLS session.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TlsError {
    /// A record header or handshake frame is truncated or oversized.
    #[error("framing error: {0}")]
    Framing(String),
    /// A protected record failed AEAD authentication.
    #[error("failed to decrypt record with sequence number {seq}")]
    Decrypt {
        /// Sequence number of the record in its epoch.
        seq: u64,
        /// Underlying AEAD error.
        #[source]
        source: gcm::GcmError,
    },
    /// A handshake message arrived in the wrong state.
    #[error("unexpected handshake message: expected one of {expected:?}, got {got:?}")]
    UnexpectedMessage {
        /// Acceptable message types in the current state.
        expected: &'static [HandshakeType],
        /// Received message type.
        got: HandshakeType,
    },
    /// A record of the wrong content type arrived.
    #[error("unexpected content type: expected {expected:?}, got {got:?}")]
    UnexpectedContent {
        /// Expected content type.
        expected: ContentType,
        /// Received content type.
        got: ContentType,
    },
    /// A message could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// The peer negotiated something this replay does not support.
    #[error("peer misbehaved: {0}")]
    PeerMisbehaved(String),
    /// The server certificate chain or signature did not verify.
    #[error("certificate verification failed: {0}")]
    Certificate(String),
    /// The server signed with a legacy or unknown scheme.
    #[error("unsupported signature scheme: {0:#06x}")]
    SignatureScheme(u16),
    /// The capture contains an alert.
    #[error("received alert: level {level}, description {description}")]
    Alert {
        /// Alert level.
        level: u8,
        /// Alert description.
        description: u8,
    },
    /// Incrementing the record sequence number would wrap.
    #[error("record sequence number exhausted")]
    SequenceWrap,
    /// The capture ended before the replay finished.
    #[error("capture ended while awaiting {0}")]
    UnexpectedEof(&'static str),
    /// Traffic key derivation failed.
    #[error(transparent)]
    KeyDerivation(#[from] hmac_sha256::HashError),
    /// The record cipher could not be keyed.
    #[error(transparent)]
    Cipher(#[from] gcm::GcmError),
    /// Trust anchors could not be loaded.
    #[error(transparent)]
    RootStore(#[from] RootCertStoreError),
}

impl TlsError {
    pub(crate) fn framing(msg: impl Into<String>) -> Self {
        Self::Framing(msg.into())
    }

    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Returns `true` if the error is an authentication failure, either of a
    /// record or of the server's certificate.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            Self::Decrypt { .. } | Self::Certificate(_) | Self::SignatureScheme(_)
        )
    }

    /// Returns `true` if the error is a framing error.
    pub fn is_framing(&self) -> bool {
        matches!(self, Self::Framing(_) | Self::UnexpectedEof(_))
    }

    /// Returns `true` if the error is a message sequencing or negotiation
    /// error.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedMessage { .. }
                | Self::UnexpectedContent { .. }
                | Self::PeerMisbehaved(_)
                | Self::Alert { .. }
                | Self::SequenceWrap
        )
    }
}
