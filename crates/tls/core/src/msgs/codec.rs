//! Bounds-checked big-endian decoding.

use crate::TlsError;

/// Cursor over a byte slice.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    offs: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader positioned at the start of `bytes`.
    pub fn init(bytes: &'a [u8]) -> Self {
        Reader {
            buf: bytes,
            offs: 0,
        }
    }

    /// Returns the unread bytes and consumes them.
    pub fn rest(&mut self) -> &'a [u8] {
        let ret = &self.buf[self.offs..];
        self.offs = self.buf.len();
        ret
    }

    /// Takes exactly `len` bytes.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], TlsError> {
        if self.left() < len {
            return Err(TlsError::decode(format!(
                "wanted {len} bytes, {} left",
                self.left()
            )));
        }
        let current = self.offs;
        self.offs += len;
        Ok(&self.buf[current..current + len])
    }

    /// Returns `true` if unread bytes remain.
    pub fn any_left(&self) -> bool {
        self.offs < self.buf.len()
    }

    /// Number of unread bytes.
    pub fn left(&self) -> usize {
        self.buf.len() - self.offs
    }

    /// Number of bytes consumed so far.
    pub fn used(&self) -> usize {
        self.offs
    }

    /// Fails if unread bytes remain.
    pub fn expect_empty(&self, what: &str) -> Result<(), TlsError> {
        if self.any_left() {
            return Err(TlsError::decode(format!(
                "{} trailing bytes after {what}",
                self.left()
            )));
        }
        Ok(())
    }

    /// Reads a u8.
    pub fn u8(&mut self) -> Result<u8, TlsError> {
        Ok(self.take(1)?[0])
    }

    /// Reads a big-endian u16.
    pub fn u16(&mut self) -> Result<u16, TlsError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Reads a big-endian u24.
    pub fn u24(&mut self) -> Result<u32, TlsError> {
        let b = self.take(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    /// Reads a u8-length-prefixed byte string.
    pub fn vec_u8(&mut self) -> Result<&'a [u8], TlsError> {
        let len = self.u8()? as usize;
        self.take(len)
    }

    /// Reads a u16-length-prefixed byte string.
    pub fn vec_u16(&mut self) -> Result<&'a [u8], TlsError> {
        let len = self.u16()? as usize;
        self.take(len)
    }

    /// Reads a u24-length-prefixed byte string.
    pub fn vec_u24(&mut self) -> Result<&'a [u8], TlsError> {
        let len = self.u24()? as usize;
        self.take(len)
    }

    /// Returns a reader over the next u16-length-prefixed byte string.
    pub fn sub_u16(&mut self) -> Result<Reader<'a>, TlsError> {
        Ok(Reader::init(self.vec_u16()?))
    }

    /// Returns a reader over the next u24-length-prefixed byte string.
    pub fn sub_u24(&mut self) -> Result<Reader<'a>, TlsError> {
        Ok(Reader::init(self.vec_u24()?))
    }
}

/// Appends a big-endian u24.
pub fn put_u24(v: u32, bytes: &mut Vec<u8>) {
    bytes.extend_from_slice(&v.to_be_bytes()[1..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads() {
        let bytes = [0x01, 0x02, 0x03, 0x00, 0x00, 0x02, 0xaa, 0xbb, 0x02, 0xcc, 0xdd];
        let mut r = Reader::init(&bytes);

        assert_eq!(r.u8().unwrap(), 0x01);
        assert_eq!(r.u16().unwrap(), 0x0203);
        assert_eq!(r.vec_u24().unwrap(), &[0xaa, 0xbb]);
        assert_eq!(r.vec_u8().unwrap(), &[0xcc, 0xdd]);
        assert!(!r.any_left());
        assert_eq!(r.used(), bytes.len());
    }

    #[test]
    fn test_truncated() {
        let mut r = Reader::init(&[0x00, 0x05, 0x01]);

        assert!(r.vec_u16().is_err());
    }

    #[test]
    fn test_put_u24() {
        let mut out = Vec::new();
        put_u24(0x010203, &mut out);

        assert_eq!(out, vec![1, 2, 3]);
    }
}
