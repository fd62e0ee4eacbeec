//! Record framing.

use crate::{
    msgs::enums::{ContentType, TLS12_VERSION},
    TlsError,
};

/// Size of the record header.
pub const HEADER_SIZE: usize = 5;
/// Maximum TLS 1.3 plaintext fragment length.
pub const MAX_FRAGMENT_LEN: usize = 1 << 14;
/// Maximum TLS 1.3 record payload length.
pub const MAX_CIPHERTEXT_LEN: usize = MAX_FRAGMENT_LEN + 256;

/// A record as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueRecord {
    /// Outer content type.
    pub typ: ContentType,
    /// `legacy_record_version`.
    pub version: u16,
    /// Record payload, which for protected records ends with the AEAD tag.
    pub payload: Vec<u8>,
}

impl OpaqueRecord {
    /// Creates a record with the TLS 1.3 legacy version.
    pub fn new(typ: ContentType, payload: Vec<u8>) -> Self {
        Self {
            typ,
            version: TLS12_VERSION,
            payload,
        }
    }

    /// Returns the 5-byte header, which is also the AEAD additional data.
    pub fn header(&self) -> [u8; HEADER_SIZE] {
        let version = self.version.to_be_bytes();
        let len = (self.payload.len() as u16).to_be_bytes();
        [self.typ.get_u8(), version[0], version[1], len[0], len[1]]
    }

    /// Returns the header followed by the payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&self.header());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// A record after decryption, carrying its inner content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainMessage {
    /// Inner content type.
    pub typ: ContentType,
    /// Plaintext with padding removed.
    pub payload: Vec<u8>,
}

/// Frames records out of a captured byte stream.
#[derive(Debug)]
pub struct RecordReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> RecordReader<'a> {
    /// Creates a reader at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns `true` if the whole capture has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.offset == self.data.len()
    }

    /// Reads the next record. Returns `None` once the capture is consumed.
    pub fn read(&mut self) -> Result<Option<OpaqueRecord>, TlsError> {
        let rest = &self.data[self.offset..];
        if rest.is_empty() {
            return Ok(None);
        }
        if rest.len() < HEADER_SIZE {
            return Err(TlsError::framing(format!(
                "truncated record header at offset {}",
                self.offset
            )));
        }

        let typ = ContentType::from(rest[0]);
        if let ContentType::Unknown(v) = typ {
            return Err(TlsError::framing(format!(
                "unknown content type {v} at offset {}",
                self.offset
            )));
        }
        let version = u16::from_be_bytes([rest[1], rest[2]]);
        let len = u16::from_be_bytes([rest[3], rest[4]]) as usize;
        if len > MAX_CIPHERTEXT_LEN {
            return Err(TlsError::framing(format!(
                "record length {len} exceeds maximum {MAX_CIPHERTEXT_LEN}"
            )));
        }
        if rest.len() < HEADER_SIZE + len {
            return Err(TlsError::framing(format!(
                "record at offset {} declares {len} bytes, {} available",
                self.offset,
                rest.len() - HEADER_SIZE
            )));
        }

        let payload = rest[HEADER_SIZE..HEADER_SIZE + len].to_vec();
        self.offset += HEADER_SIZE + len;

        Ok(Some(OpaqueRecord {
            typ,
            version,
            payload,
        }))
    }
}

impl Iterator for RecordReader<'_> {
    type Item = Result<OpaqueRecord, TlsError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[test]
    fn test_reads_records_in_order() {
        let first = OpaqueRecord::new(ContentType::Handshake, vec![1, 2, 3]);
        let second = OpaqueRecord::new(ContentType::ApplicationData, vec![4; 40]);
        let capture = [first.encode(), second.encode()].concat();

        let records = RecordReader::new(&capture)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(records, vec![first, second]);
    }

    #[test]
    fn test_header() {
        let record = OpaqueRecord::new(ContentType::ApplicationData, vec![0; 0x1234]);

        assert_eq!(record.header(), [0x17, 0x03, 0x03, 0x12, 0x34]);
    }

    #[rstest]
    #[case::truncated_header(vec![0x16, 0x03])]
    #[case::truncated_payload(vec![0x16, 0x03, 0x03, 0x00, 0x05, 0x01])]
    #[case::oversized(vec![0x17, 0x03, 0x03, 0x41, 0x01])]
    #[case::unknown_type(vec![0x42, 0x03, 0x03, 0x00, 0x00])]
    fn test_framing_errors(#[case] capture: Vec<u8>) {
        let err = RecordReader::new(&capture).read().unwrap_err();

        assert!(err.is_framing());
    }

    #[test]
    fn test_empty_capture() {
        let mut reader = RecordReader::new(&[]);

        assert!(reader.read().unwrap().is_none());
        assert!(reader.is_exhausted());
    }
}
