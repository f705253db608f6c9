//! On-disk record format for the event log file.
//!
//! One event per line:
//!
//! ```text
//! <crc32 of json, 8 lowercase hex digits> TAB <event json> LF
//! ```
//!
//! The checksum guards against torn or bit-rotted records. It is not a
//! tamper-evidence mechanism; that is the hash chain's job.

use taskledger_core::{Error, Event, Result};

/// Separator between checksum and body
pub const FIELD_SEPARATOR: u8 = b'\t';

/// Why a record failed to decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Missing separator or non-hex checksum
    Malformed,
    /// Checksum does not match the body
    ChecksumMismatch {
        /// Checksum stored in the record
        stored: u32,
        /// Checksum of the body as read
        computed: u32,
    },
    /// Body is not a valid event
    Body(String),
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::Malformed => write!(f, "malformed record"),
            RecordError::ChecksumMismatch { stored, computed } => write!(
                f,
                "checksum mismatch: stored {:08x}, computed {:08x}",
                stored, computed
            ),
            RecordError::Body(msg) => write!(f, "undecodable event: {}", msg),
        }
    }
}

/// Encode an event as one log line, including the trailing newline
pub fn encode_record(event: &Event) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(event).map_err(Error::from)?;
    let mut record = Vec::with_capacity(body.len() + 10);
    record.extend_from_slice(format!("{:08x}", crc32fast::hash(&body)).as_bytes());
    record.push(FIELD_SEPARATOR);
    record.extend_from_slice(&body);
    record.push(b'\n');
    Ok(record)
}

/// Decode one log line (without its trailing newline)
pub fn decode_record(line: &[u8]) -> std::result::Result<Event, RecordError> {
    let sep = line
        .iter()
        .position(|b| *b == FIELD_SEPARATOR)
        .ok_or(RecordError::Malformed)?;
    let (crc_hex, rest) = line.split_at(sep);
    let body = &rest[1..];

    let stored = std::str::from_utf8(crc_hex)
        .ok()
        .and_then(|s| u32::from_str_radix(s, 16).ok())
        .ok_or(RecordError::Malformed)?;
    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(RecordError::ChecksumMismatch { stored, computed });
    }

    serde_json::from_slice(body).map_err(|e| RecordError::Body(e.to_string()))
}
