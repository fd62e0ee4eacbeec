//! Handshake message decoding.
//!
//! Every decoded [`HandshakeMessage`] keeps the exact bytes it was decoded
//! from, header included, since those are what the transcript hash covers.

use crate::{
    msgs::{
        codec::{put_u24, Reader},
        enums::{extension, HandshakeType, SignatureScheme},
    },
    TlsError,
};

/// Size of the handshake message header.
pub const HANDSHAKE_HEADER_SIZE: usize = 4;

/// Random value sent in a HelloRetryRequest.
pub const HELLO_RETRY_REQUEST_RANDOM: [u8; 32] = [
    0xcf, 0x21, 0xad, 0x74, 0xe5, 0x9a, 0x61, 0x11, 0xbe, 0x1d, 0x8c, 0x02, 0x1e, 0x65, 0xb8, 0x91,
    0xc2, 0xa2, 0x11, 0x16, 0x7a, 0xbb, 0x8c, 0x5e, 0x07, 0x9e, 0x09, 0xe2, 0xc8, 0xa8, 0x33, 0x9c,
];

/// A raw extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    /// Extension type.
    pub typ: u16,
    /// Extension body.
    pub data: Vec<u8>,
}

fn read_extensions(r: &mut Reader<'_>) -> Result<Vec<Extension>, TlsError> {
    // Extensions are optional in a hello when no bytes remain.
    if !r.any_left() {
        return Ok(Vec::new());
    }

    let mut sub = r.sub_u16()?;
    let mut exts = Vec::new();
    while sub.any_left() {
        let typ = sub.u16()?;
        let data = sub.vec_u16()?.to_vec();
        exts.push(Extension { typ, data });
    }
    Ok(exts)
}

fn find_extension(exts: &[Extension], typ: u16) -> Option<&[u8]> {
    exts.iter()
        .find(|ext| ext.typ == typ)
        .map(|ext| ext.data.as_slice())
}

fn read_random(r: &mut Reader<'_>) -> Result<[u8; 32], TlsError> {
    let mut random = [0u8; 32];
    random.copy_from_slice(r.take(32)?);
    Ok(random)
}

/// ClientHello body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHelloPayload {
    /// `legacy_version`.
    pub legacy_version: u16,
    /// Client random.
    pub random: [u8; 32],
    /// `legacy_session_id`.
    pub session_id: Vec<u8>,
    /// Offered cipher suites.
    pub cipher_suites: Vec<u16>,
    /// Extensions.
    pub extensions: Vec<Extension>,
}

impl ClientHelloPayload {
    fn read(r: &mut Reader<'_>) -> Result<Self, TlsError> {
        let legacy_version = r.u16()?;
        let random = read_random(r)?;
        let session_id = r.vec_u8()?.to_vec();

        let mut suites = r.sub_u16()?;
        let mut cipher_suites = Vec::new();
        while suites.any_left() {
            cipher_suites.push(suites.u16()?);
        }

        // legacy_compression_methods
        r.vec_u8()?;
        let extensions = read_extensions(r)?;

        Ok(Self {
            legacy_version,
            random,
            session_id,
            cipher_suites,
            extensions,
        })
    }

    /// Returns the host name from the `server_name` extension, if any.
    pub fn server_name(&self) -> Option<String> {
        let data = find_extension(&self.extensions, extension::SERVER_NAME)?;
        let mut list = Reader::init(data).sub_u16().ok()?;
        while list.any_left() {
            let name_type = list.u8().ok()?;
            let name = list.vec_u16().ok()?;
            if name_type == 0 {
                return String::from_utf8(name.to_vec()).ok();
            }
        }
        None
    }
}

/// ServerHello body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHelloPayload {
    /// `legacy_version`.
    pub legacy_version: u16,
    /// Server random.
    pub random: [u8; 32],
    /// `legacy_session_id_echo`.
    pub session_id: Vec<u8>,
    /// Selected cipher suite.
    pub cipher_suite: u16,
    /// `legacy_compression_method`.
    pub compression_method: u8,
    /// Extensions.
    pub extensions: Vec<Extension>,
}

impl ServerHelloPayload {
    fn read(r: &mut Reader<'_>) -> Result<Self, TlsError> {
        Ok(Self {
            legacy_version: r.u16()?,
            random: read_random(r)?,
            session_id: r.vec_u8()?.to_vec(),
            cipher_suite: r.u16()?,
            compression_method: r.u8()?,
            extensions: read_extensions(r)?,
        })
    }

    /// Returns the version selected through `supported_versions`.
    pub fn supported_version(&self) -> Option<u16> {
        let data = find_extension(&self.extensions, extension::SUPPORTED_VERSIONS)?;
        let mut r = Reader::init(data);
        let version = r.u16().ok()?;
        r.expect_empty("supported_versions").ok()?;
        Some(version)
    }

    /// Returns `true` if this is a HelloRetryRequest.
    pub fn is_hello_retry_request(&self) -> bool {
        self.random == HELLO_RETRY_REQUEST_RANDOM
    }
}

/// An entry of a TLS 1.3 Certificate message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateEntry {
    /// DER-encoded certificate.
    pub cert: Vec<u8>,
    /// Per-certificate extensions.
    pub extensions: Vec<Extension>,
}

/// Certificate body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePayload {
    /// `certificate_request_context`.
    pub context: Vec<u8>,
    /// Chain, end entity first.
    pub entries: Vec<CertificateEntry>,
}

impl CertificatePayload {
    fn read(r: &mut Reader<'_>) -> Result<Self, TlsError> {
        let context = r.vec_u8()?.to_vec();
        let mut list = r.sub_u24()?;
        let mut entries = Vec::new();
        while list.any_left() {
            let cert = list.vec_u24()?.to_vec();
            let extensions = read_extensions(&mut list)?;
            entries.push(CertificateEntry { cert, extensions });
        }
        Ok(Self { context, entries })
    }

    /// Returns the end entity certificate.
    pub fn end_entity(&self) -> Option<&[u8]> {
        self.entries.first().map(|entry| entry.cert.as_slice())
    }

    /// Returns the certificates following the end entity.
    pub fn intermediates(&self) -> Vec<&[u8]> {
        self.entries
            .iter()
            .skip(1)
            .map(|entry| entry.cert.as_slice())
            .collect()
    }
}

/// CertificateVerify body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitallySigned {
    /// Signature scheme.
    pub scheme: SignatureScheme,
    /// Signature bytes.
    pub sig: Vec<u8>,
}

impl DigitallySigned {
    fn read(r: &mut Reader<'_>) -> Result<Self, TlsError> {
        Ok(Self {
            scheme: SignatureScheme::from(r.u16()?),
            sig: r.vec_u16()?.to_vec(),
        })
    }
}

/// Decoded handshake message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakePayload {
    /// ClientHello.
    ClientHello(ClientHelloPayload),
    /// ServerHello.
    ServerHello(ServerHelloPayload),
    /// EncryptedExtensions.
    EncryptedExtensions(Vec<Extension>),
    /// CertificateRequest, kept opaque.
    CertificateRequest(Vec<u8>),
    /// Certificate.
    Certificate(CertificatePayload),
    /// CertificateVerify.
    CertificateVerify(DigitallySigned),
    /// Finished verify data.
    Finished(Vec<u8>),
    /// NewSessionTicket, kept opaque.
    NewSessionTicket(Vec<u8>),
    /// Any other message, kept opaque.
    Unknown(Vec<u8>),
}

/// A handshake message with its raw encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMessage {
    /// Message type.
    pub typ: HandshakeType,
    /// Decoded body.
    pub payload: HandshakePayload,
    encoding: Vec<u8>,
}

impl HandshakeMessage {
    /// Decodes one complete message, header included.
    pub fn read_bytes(bytes: &[u8]) -> Result<Self, TlsError> {
        let mut r = Reader::init(bytes);
        let typ = HandshakeType::from(r.u8()?);
        let mut body = r.sub_u24()?;
        r.expect_empty("handshake message")?;

        let payload = match typ {
            HandshakeType::ClientHello => {
                HandshakePayload::ClientHello(ClientHelloPayload::read(&mut body)?)
            }
            HandshakeType::ServerHello => {
                HandshakePayload::ServerHello(ServerHelloPayload::read(&mut body)?)
            }
            HandshakeType::EncryptedExtensions => {
                HandshakePayload::EncryptedExtensions(read_extensions(&mut body)?)
            }
            HandshakeType::CertificateRequest => {
                HandshakePayload::CertificateRequest(body.rest().to_vec())
            }
            HandshakeType::Certificate => {
                HandshakePayload::Certificate(CertificatePayload::read(&mut body)?)
            }
            HandshakeType::CertificateVerify => {
                HandshakePayload::CertificateVerify(DigitallySigned::read(&mut body)?)
            }
            HandshakeType::Finished => HandshakePayload::Finished(body.rest().to_vec()),
            HandshakeType::NewSessionTicket => {
                HandshakePayload::NewSessionTicket(body.rest().to_vec())
            }
            _ => HandshakePayload::Unknown(body.rest().to_vec()),
        };
        body.expect_empty("handshake body")?;

        Ok(Self {
            typ,
            payload,
            encoding: bytes.to_vec(),
        })
    }

    /// Returns the exact bytes the message was decoded from.
    pub fn encoding(&self) -> &[u8] {
        &self.encoding
    }

    /// Frames `body` as a handshake message of type `typ`.
    pub fn encode(typ: HandshakeType, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(HANDSHAKE_HEADER_SIZE + body.len());
        out.push(typ.get_u8());
        put_u24(body.len() as u32, &mut out);
        out.extend_from_slice(body);
        out
    }
}

/// Reassembles handshake messages from record payloads.
///
/// Messages may span records and a record may carry several messages.
#[derive(Debug, Default)]
pub struct HandshakeJoiner {
    buf: Vec<u8>,
}

impl HandshakeJoiner {
    /// Creates an empty joiner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the payload of a handshake record.
    pub fn push(&mut self, payload: &[u8]) {
        self.buf.extend_from_slice(payload);
    }

    /// Returns `true` if no partial message is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Pops the next complete message, if one is buffered.
    pub fn pop(&mut self) -> Result<Option<HandshakeMessage>, TlsError> {
        if self.buf.len() < HANDSHAKE_HEADER_SIZE {
            return Ok(None);
        }

        let len = u32::from_be_bytes([0, self.buf[1], self.buf[2], self.buf[3]]) as usize;
        let total = HANDSHAKE_HEADER_SIZE + len;
        if self.buf.len() < total {
            return Ok(None);
        }

        let rest = self.buf.split_off(total);
        let bytes = std::mem::replace(&mut self.buf, rest);
        HandshakeMessage::read_bytes(&bytes).map(Some)
    }
}
