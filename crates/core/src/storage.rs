//! Interchange files.
//!
//! JSON files are written with a one-space indent and, since every map in
//! them is a `BTreeMap`, with sorted keys, so writing the same value twice
//! produces identical bytes.

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::ser::{PrettyFormatter, Serializer};
use tracing::debug;

use crate::Error;

/// Reads a raw capture.
pub fn read_capture(path: &Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|e| {
        Error::io()
            .with_msg(format!("failed to read capture {}", path.display()))
            .with_source(e)
    })
}

/// Writes a raw capture.
pub fn write_capture(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    std::fs::write(path, bytes).map_err(|e| {
        Error::io()
            .with_msg(format!("failed to write capture {}", path.display()))
            .with_source(e)
    })
}

/// Serializes `value` the way it is stored on disk.
pub fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b" "));
    value.serialize(&mut ser)?;
    Ok(buf)
}

/// Writes `value` as JSON to `path`.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Error> {
    let json = to_json(value)?;
    std::fs::write(path, json).map_err(|e| {
        Error::io()
            .with_msg(format!("failed to write {}", path.display()))
            .with_source(e)
    })?;
    debug!("wrote {}", path.display());
    Ok(())
}

/// Reads JSON from `path`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let bytes = std::fs::read(path).map_err(|e| {
        Error::io()
            .with_msg(format!("failed to read {}", path.display()))
            .with_source(e)
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        Error::encoding()
            .with_msg(format!("malformed json in {}", path.display()))
            .with_source(e)
    })
}

pub(crate) fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, Error> {
    hex::decode(value).map_err(|e| {
        Error::encoding()
            .with_msg(format!("{field} is not valid hex"))
            .with_source(e)
    })
}

pub(crate) fn decode_array<const N: usize>(field: &str, value: &str) -> Result<[u8; N], Error> {
    let bytes = decode_hex(field, value)?;
    bytes.as_slice().try_into().map_err(|_| {
        Error::encoding().with_msg(format!(
            "{field} must be {N} bytes, got {}",
            bytes.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_one_space_indent() {
        let mut map = BTreeMap::new();
        map.insert("b", "02");
        map.insert("a", "01");

        let json = String::from_utf8(to_json(&map).unwrap()).unwrap();

        assert_eq!(json, "{\n \"a\": \"01\",\n \"b\": \"02\"\n}");
    }

    #[test]
    fn test_decode_array() {
        assert_eq!(decode_array::<2>("x", "abcd").unwrap(), [0xab, 0xcd]);
        assert!(decode_array::<2>("x", "abcdef").unwrap_err().is_encoding());
        assert!(decode_hex("x", "zz").unwrap_err().is_encoding());
    }

    #[test]
    fn test_missing_file() {
        let err = read_json::<BTreeMap<String, String>>(Path::new("/nonexistent/x.json"))
            .unwrap_err();

        assert!(err.is_io());
    }
}
