//! Framing for small local state files.
//!
//! A file is a header followed by one frame:
//! - Magic bytes and a version byte in the header
//! - Length-prefixed JSON for the payload
//! - CRC32 over the payload for corruption detection

use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

/// Current codec version.
const CODEC_VERSION: u8 = 1;

/// Magic bytes identifying binwatch state files.
pub const MAGIC: [u8; 4] = *b"BWST";

/// Local state is tiny; anything bigger is garbage.
const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Serializes a value into one checksummed frame.
///
/// Format:
/// ```text
/// [length: 4 bytes LE][data: N bytes JSON][crc32: 4 bytes LE]
/// ```
pub fn encode<T: Serialize>(value: &T) -> IoResult<Vec<u8>> {
    let data = serde_json::to_vec(value)
        .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("serialization failed: {e}")))?;

    let len = u32::try_from(data.len())
        .map_err(|_| IoError::new(ErrorKind::InvalidData, "frame too large"))?;

    let mut out = Vec::with_capacity(4 + data.len() + 4);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&checksum(&data).to_le_bytes());
    Ok(out)
}

/// Reads one frame, verifying its checksum.
///
/// # Errors
/// - Truncated input
/// - Oversized length prefix
/// - Checksum mismatch
/// - Payload that does not deserialize into `T`
pub fn decode<T: DeserializeOwned>(reader: &mut impl Read) -> IoResult<T> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("frame size {len} exceeds maximum {MAX_FRAME_SIZE}"),
        ));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;
    let stored = u32::from_le_bytes(crc_bytes);
    let computed = checksum(&data);
    if stored != computed {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("CRC mismatch: stored={stored:08x}, computed={computed:08x}"),
        ));
    }

    serde_json::from_slice(&data)
        .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("deserialization failed: {e}")))
}

/// Writes the file header (magic + version).
pub fn write_header(writer: &mut impl Write) -> IoResult<()> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&[CODEC_VERSION])
}

/// Reads and validates the file header.
pub fn read_header(reader: &mut impl Read) -> IoResult<()> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(IoError::new(ErrorKind::InvalidData, "invalid magic bytes"));
    }

    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != CODEC_VERSION {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("unsupported codec version: {} (expected {CODEC_VERSION})", version[0]),
        ));
    }
    Ok(())
}

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn detects_corruption() {
        let mut encoded = encode(&"cached token value".to_string()).unwrap();
        encoded[8] ^= 0xFF;

        let result: IoResult<String> = decode(&mut Cursor::new(encoded));
        assert!(result.unwrap_err().to_string().contains("CRC"));
    }

    #[test]
    fn rejects_oversized_frame() {
        let bad = (200_000_000u32).to_le_bytes().to_vec();
        let result: IoResult<String> = decode(&mut Cursor::new(bad));
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn rejects_foreign_header() {
        let mut cursor = Cursor::new(b"XXXX\x01".to_vec());
        assert!(read_header(&mut cursor).is_err());

        let mut buf = Vec::new();
        write_header(&mut buf).unwrap();
        assert!(read_header(&mut Cursor::new(buf)).is_ok());
    }
}
