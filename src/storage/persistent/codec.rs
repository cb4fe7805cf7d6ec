//! Binary codec for ledger files.
//!
//! A ledger file is a header followed by exactly one frame:
//! - Magic bytes plus codec version byte
//! - Length-prefixed JSON payload
//! - CRC32 checksum for corruption detection

use std::io::{Cursor, Error as IoError, ErrorKind, Read, Result as IoResult, Write};

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

/// Current codec version.
const CODEC_VERSION: u8 = 1;

/// Magic bytes identifying stepledger files.
pub const MAGIC: [u8; 4] = *b"STLG";

/// Ledgers hold one row per data type; anything near this is not a ledger.
const MAX_ENTRY_SIZE: usize = 16 * 1024 * 1024;

/// Serializes a value to a checksummed frame.
///
/// Format:
/// ```text
/// [version: 1 byte][length: 4 bytes LE][data: N bytes JSON][crc32: 4 bytes LE]
/// ```
pub fn encode<T: Serialize>(value: &T) -> IoResult<Vec<u8>> {
    let data = serde_json::to_vec(value)
        .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("serialization failed: {e}")))?;

    let len = u32::try_from(data.len())
        .map_err(|_| IoError::new(ErrorKind::InvalidData, "entry too large to frame"))?;

    let mut hasher = Hasher::new();
    hasher.update(&data);
    let crc = hasher.finalize();

    let mut out = Vec::with_capacity(1 + 4 + data.len() + 4);
    out.push(CODEC_VERSION);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&crc.to_le_bytes());

    Ok(out)
}

/// Deserializes a frame, verifying its checksum.
///
/// # Errors
/// - Returns error if checksum fails (corruption detected)
/// - Returns error if version is unsupported
/// - Returns error if deserialization fails
pub fn decode<T: DeserializeOwned>(reader: &mut impl Read) -> IoResult<T> {
    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;

    if version[0] != CODEC_VERSION {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("unsupported codec version: {} (expected {CODEC_VERSION})", version[0]),
        ));
    }

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_ENTRY_SIZE {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("entry size {len} exceeds maximum {MAX_ENTRY_SIZE}"),
        ));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;
    let stored_crc = u32::from_le_bytes(crc_bytes);

    let mut hasher = Hasher::new();
    hasher.update(&data);
    let computed_crc = hasher.finalize();

    if stored_crc != computed_crc {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!(
                "CRC mismatch: stored={stored_crc:08x}, computed={computed_crc:08x} (data corrupted)"
            ),
        ));
    }

    serde_json::from_slice(&data)
        .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("deserialization failed: {e}")))
}

/// Write the file header (magic + version).
pub fn write_header(writer: &mut impl Write) -> IoResult<()> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&[CODEC_VERSION])?;
    Ok(())
}

/// Read and validate the file header.
pub fn read_header(reader: &mut impl Read) -> IoResult<u8> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;

    if magic != MAGIC {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("invalid magic bytes: expected {MAGIC:?}, got {magic:?}"),
        ));
    }

    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;

    if version[0] != CODEC_VERSION {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("unsupported file version: {} (expected {CODEC_VERSION})", version[0]),
        ));
    }

    Ok(version[0])
}

/// Encodes a whole file: header plus one frame.
pub fn encode_document<T: Serialize>(value: &T) -> IoResult<Vec<u8>> {
    let mut out = Vec::new();
    write_header(&mut out)?;
    out.extend_from_slice(&encode(value)?);
    Ok(out)
}

/// Decodes a whole file, rejecting trailing bytes.
pub fn decode_document<T: DeserializeOwned>(bytes: &[u8]) -> IoResult<T> {
    let mut cursor = Cursor::new(bytes);
    read_header(&mut cursor)?;
    let value = decode(&mut cursor)?;

    let consumed = usize::try_from(cursor.position()).unwrap_or(usize::MAX);
    if consumed != bytes.len() {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("{} trailing bytes after ledger frame", bytes.len().saturating_sub(consumed)),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_roundtrip_document() {
        let mut value = BTreeMap::new();
        value.insert("users".to_string(), "2.0.0".to_string());
        let bytes = encode_document(&value).unwrap();
        assert_eq!(&bytes[..4], b"STLG");

        let decoded: BTreeMap<String, String> = decode_document(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_detects_corruption() {
        let mut encoded = encode_document(&"test data".to_string()).unwrap();
        let idx = encoded.len() - 6;
        encoded[idx] ^= 0xFF;

        let err = decode_document::<String>(&encoded).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(err.to_string().contains("CRC"));
    }

    #[test]
    fn test_detects_truncation() {
        let encoded = encode_document(&"some ledger".to_string()).unwrap();
        let err = decode_document::<String>(&encoded[..encoded.len() - 3]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut encoded = encode_document(&1u32).unwrap();
        encoded.push(0);
        let err = decode_document::<u32>(&encoded).unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }

    #[test]
    fn test_rejects_wrong_magic() {
        let mut encoded = encode_document(&1u32).unwrap();
        encoded[0] = b'X';
        let err = decode_document::<u32>(&encoded).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_rejects_oversized_entry() {
        let mut bad_data = vec![CODEC_VERSION];
        bad_data.extend_from_slice(&(200_000_000u32).to_le_bytes());

        let err = decode::<String>(&mut Cursor::new(bad_data)).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }
}
