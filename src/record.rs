//! Record codec for the append log.
//!
//! Each record is self-delimiting: a fixed header carrying the key and value
//! lengths, followed by the key bytes and the value bytes. Concatenated
//! encodings decode back front-to-back without knowing the record count.

use std::io::Read;

use crate::error::{Error, Result};

/// Size of the record header in bytes, computed from its field types.
pub const HEADER_LEN: usize = std::mem::size_of::<u32>()
    + std::mem::size_of::<u32>()
    + std::mem::size_of::<u32>();

/// Fixed-size header preceding every record on disk.
#[derive(Debug)]
struct RecordHeader {
    /// CRC32 checksum of the key and value bytes
    crc: u32,
    /// Length of the key in bytes
    key_len: u32,
    /// Length of the value in bytes
    value_len: u32,
}

impl RecordHeader {
    fn serialize(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.crc.to_le_bytes());
        buffer.extend_from_slice(&self.key_len.to_le_bytes());
        buffer.extend_from_slice(&self.value_len.to_le_bytes());
    }

    fn deserialize(buf: &[u8; HEADER_LEN]) -> Self {
        Self {
            crc: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            key_len: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            value_len: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
        }
    }
}

fn checksum(key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

/// Appends the encoding of one record to `buffer`.
pub fn encode(key: &str, value: &[u8], buffer: &mut Vec<u8>) {
    let header = RecordHeader {
        crc: checksum(key.as_bytes(), value),
        key_len: key.len() as u32,
        value_len: value.len() as u32,
    };
    header.serialize(buffer);
    buffer.extend_from_slice(key.as_bytes());
    buffer.extend_from_slice(value);
}

/// Number of bytes `encode` produces for this key/value pair.
pub fn encoded_len(key: &str, value: &[u8]) -> u64 {
    HEADER_LEN as u64 + key.len() as u64 + value.len() as u64
}

/// Decodes one record from the reader's current position.
///
/// Returns `Ok(None)` on a clean end-of-file at a record boundary.
/// `offset` is the reader's byte position, carried only for error reporting.
///
/// # Errors
///
/// Returns `Error::CorruptRecord` on a truncated header or body, a CRC
/// mismatch, or a key that is not valid UTF-8.
pub fn decode_from<R: Read>(reader: &mut R, offset: u64) -> Result<Option<(String, Vec<u8>)>> {
    let mut header_buf = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        match reader.read(&mut header_buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    if filled == 0 {
        return Ok(None);
    }
    if filled < HEADER_LEN {
        return Err(Error::CorruptRecord {
            offset,
            reason: "truncated header".to_string(),
        });
    }

    let header = RecordHeader::deserialize(&header_buf);

    let mut key = vec![0u8; header.key_len as usize];
    let mut value = vec![0u8; header.value_len as usize];
    read_body(reader, &mut key, offset)?;
    read_body(reader, &mut value, offset)?;

    if checksum(&key, &value) != header.crc {
        return Err(Error::CorruptRecord {
            offset,
            reason: "checksum mismatch".to_string(),
        });
    }

    let key = String::from_utf8(key).map_err(|_| Error::CorruptRecord {
        offset,
        reason: "key is not valid UTF-8".to_string(),
    })?;

    Ok(Some((key, value)))
}

fn read_body<R: Read>(reader: &mut R, buf: &mut [u8], offset: u64) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::CorruptRecord {
                offset,
                reason: "truncated record body".to_string(),
            }
        } else {
            Error::Io(e)
        }
    })
}
