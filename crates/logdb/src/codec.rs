//! Record codec
//!
//! One log record is a variable-length blob:
//!
//! ```text
//! offset 0..4   : u32 timestamp, big-endian (seconds since the 1904 epoch)
//! offset 4..N   : app name bytes, NUL-terminated
//! offset N..M   : message bytes, NUL-terminated
//! ```
//!
//! There is no length prefix; the record database tracks each record's size.
//! Bytes after the message terminator are ignored.

use std::fmt;
use std::ops::Range;

use thiserror::Error;

/// Size of the timestamp header
pub const TIMESTAMP_LEN: usize = 4;

/// Which string field of a record failed to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    AppName,
    Message,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::AppName => write!(f, "app name"),
            Field::Message => write!(f, "message"),
        }
    }
}

/// A record that does not match the wire format
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Shorter than the timestamp header
    #[error("record of {len} bytes is shorter than its timestamp")]
    Truncated { len: usize },

    /// A string field runs to the end of the record
    #[error("{0} is not NUL-terminated")]
    MissingTerminator(Field),

    /// A string field is not UTF-8
    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(Field),
}

/// Borrowed view of a decoded record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordView<'a> {
    pub timestamp: u32,
    pub app_name: &'a str,
    pub message: &'a str,
}

impl RecordView<'_> {
    /// Copy into an owned record
    pub fn to_record(&self) -> LogRecord {
        LogRecord {
            timestamp: self.timestamp,
            app_name: self.app_name.to_string(),
            message: self.message.to_string(),
        }
    }
}

/// Owned log record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogRecord {
    pub timestamp: u32,
    pub app_name: String,
    pub message: String,
}

/// Byte ranges of a validated record's string fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSpans {
    pub timestamp: u32,
    pub app_name: Range<usize>,
    pub message: Range<usize>,
}

impl RecordSpans {
    /// View the fields in the bytes these spans were decoded from
    pub fn view<'a>(&self, bytes: &'a [u8]) -> RecordView<'a> {
        let text = |range: &Range<usize>| {
            bytes
                .get(range.clone())
                .and_then(|b| std::str::from_utf8(b).ok())
                .unwrap_or_default()
        };
        RecordView {
            timestamp: self.timestamp,
            app_name: text(&self.app_name),
            message: text(&self.message),
        }
    }
}

/// Encoded size of a record
pub fn encoded_len(app_name: &str, message: &str) -> usize {
    TIMESTAMP_LEN + app_name.len() + 1 + message.len() + 1
}

/// Encode a record
///
/// Neither string may contain a NUL byte; the first NUL would end the field
/// on decode.
pub fn encode(timestamp: u32, app_name: &str, message: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len(app_name, message));
    buf.extend_from_slice(&timestamp.to_be_bytes());
    buf.extend_from_slice(app_name.as_bytes());
    buf.push(0);
    buf.extend_from_slice(message.as_bytes());
    buf.push(0);
    buf
}

/// Read only the timestamp header
pub fn read_timestamp(bytes: &[u8]) -> Result<u32, CodecError> {
    let header: [u8; TIMESTAMP_LEN] = bytes
        .get(..TIMESTAMP_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or(CodecError::Truncated { len: bytes.len() })?;
    Ok(u32::from_be_bytes(header))
}

/// Decode a record without copying its strings
pub fn decode(bytes: &[u8]) -> Result<RecordView<'_>, CodecError> {
    Ok(decode_spans(bytes)?.view(bytes))
}

/// Validate a record and locate its string fields
pub fn decode_spans(bytes: &[u8]) -> Result<RecordSpans, CodecError> {
    let timestamp = read_timestamp(bytes)?;
    let app_name = field_span(bytes, TIMESTAMP_LEN, Field::AppName)?;
    let message = field_span(bytes, app_name.end + 1, Field::Message)?;
    Ok(RecordSpans {
        timestamp,
        app_name,
        message,
    })
}

/// Span of the NUL-terminated UTF-8 field starting at `start`
fn field_span(bytes: &[u8], start: usize, field: Field) -> Result<Range<usize>, CodecError> {
    let rest = bytes.get(start..).unwrap_or_default();
    let len = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(CodecError::MissingTerminator(field))?;
    std::str::from_utf8(&rest[..len]).map_err(|_| CodecError::InvalidUtf8(field))?;
    Ok(start..start + len)
}
