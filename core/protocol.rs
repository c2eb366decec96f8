// Syslog-style line handling - pure byte slicing, no I/O
use crate::types::{HEADER_SEPARATORS, MAX_DATAGRAM_LEN, MAX_OUTPUT_LEN};

/// Raised when a line has fewer than three spaces in front of its payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("logging message is badly formatted: found {found} of {} header separators in {line:?}", HEADER_SEPARATORS)]
pub struct MalformedMessage {
    pub found: usize,
    pub line: String,
}

/// Text of a received datagram: capped at `MAX_DATAGRAM_LEN` and cut at the
/// first NUL byte, the way a C string reading of the receive buffer sees it.
pub fn message_text(raw: &[u8]) -> &[u8] {
    let raw = &raw[..raw.len().min(MAX_DATAGRAM_LEN)];
    match raw.iter().position(|&b| b == 0) {
        Some(end) => &raw[..end],
        None => raw,
    }
}

/// Strip the `<priority>Month Day HH:MM:SS` header, returning everything
/// after the third space (`host: message`).
///
/// Only the separators are counted; priority and timestamp syntax are not
/// validated. Consecutive spaces each count as a separator.
pub fn strip(line: &[u8]) -> Result<&[u8], MalformedMessage> {
    let mut rest = line;
    for found in 0..HEADER_SEPARATORS {
        match rest.iter().position(|&b| b == b' ') {
            Some(space) => rest = &rest[space + 1..],
            None => {
                return Err(MalformedMessage {
                    found,
                    line: String::from_utf8_lossy(line).into_owned(),
                })
            }
        }
    }
    Ok(truncate_output(rest))
}

/// Cut a payload to the longest length sinks and the report will carry.
pub fn truncate_output(payload: &[u8]) -> &[u8] {
    &payload[..payload.len().min(MAX_OUTPUT_LEN)]
}
