//! Frames and their encoded log records.
//!
//! # Wire form
//!
//! ```text
//! <timestamp_ms>, <HEX><HEX>...
//! 12345, 010203
//! ```
//!
//! The encoded body always travels with its exact length, so a zero payload
//! byte (rendered as "00") is never mistaken for a record boundary.

use std::fmt;

/// Separator between timestamp and hex payload.
pub const SEPARATOR: &str = ", ";

/// Decimal digits of the largest possible timestamp (`u64::MAX`).
pub const MAX_TIMESTAMP_DIGITS: usize = 20;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Worst-case encoded size of a record carrying `payload_len` bytes.
#[inline]
pub const fn max_encoded_len(payload_len: usize) -> usize {
    MAX_TIMESTAMP_DIGITS + SEPARATOR.len() + payload_len * 2
}

/// Largest payload whose worst-case encoding fits in `budget` bytes.
#[inline]
pub const fn max_payload_for(budget: usize) -> usize {
    budget.saturating_sub(MAX_TIMESTAMP_DIGITS + SEPARATOR.len()) / 2
}

/// Bytes captured from the peripheral between two idle gaps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for Frame {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

/// A timestamped frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    /// Monotonic tick count (ms since boot) at encode time.
    pub timestamp_ms: u64,
    pub payload: Vec<u8>,
}

impl LogRecord {
    /// Stamp a completed frame.
    pub fn from_frame(frame: Frame, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            payload: frame.into_bytes(),
        }
    }

    /// Exact length of [`LogRecord::encode`]'s output.
    pub fn encoded_len(&self) -> usize {
        decimal_digits(self.timestamp_ms) + SEPARATOR.len() + self.payload.len() * 2
    }

    /// Render the textual body: decimal timestamp, separator, uppercase hex.
    pub fn encode(&self) -> EncodedRecord {
        let mut bytes = Vec::with_capacity(self.encoded_len());
        bytes.extend_from_slice(self.timestamp_ms.to_string().as_bytes());
        bytes.extend_from_slice(SEPARATOR.as_bytes());
        for &b in &self.payload {
            bytes.push(HEX_DIGITS[(b >> 4) as usize]);
            bytes.push(HEX_DIGITS[(b & 0x0F) as usize]);
        }
        EncodedRecord { bytes }
    }
}

/// Encode a frame captured at `timestamp_ms`.
pub fn encode_frame(frame: Frame, timestamp_ms: u64) -> EncodedRecord {
    LogRecord::from_frame(frame, timestamp_ms).encode()
}

/// Encoded record body as queued and posted. Its length is the
/// `Content-Length` of the request that carries it.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedRecord {
    bytes: Vec<u8>,
}

impl EncodedRecord {
    /// Rebuild a record from bytes taken off the queue.
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Display for EncodedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.bytes))
    }
}

impl fmt::Debug for EncodedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedRecord({:?})", String::from_utf8_lossy(&self.bytes))
    }
}

fn decimal_digits(mut value: u64) -> usize {
    let mut digits = 1;
    while value >= 10 {
        value /= 10;
        digits += 1;
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_hex_uppercase() {
        let record = LogRecord::from_frame(Frame::from(&[0x01, 0x02, 0x03][..]), 1234);
        assert_eq!(record.encode().to_string(), "1234, 010203");

        let record = LogRecord::from_frame(Frame::from(&[0xAB, 0xcd, 0x0f][..]), 0);
        assert_eq!(record.encode().to_string(), "0, ABCD0F");
    }

    #[test]
    fn test_zero_bytes_are_payload() {
        let encoded = encode_frame(Frame::from(&[0x00, 0x00][..]), 7);
        assert_eq!(encoded.as_bytes(), b"7, 0000");
        assert_eq!(encoded.len(), 7);
    }

    #[test]
    fn test_encoded_len_matches() {
        for ts in [0u64, 9, 10, 99, 100, 65_535, u64::MAX] {
            let record = LogRecord {
                timestamp_ms: ts,
                payload: vec![0x5A; 13],
            };
            assert_eq!(record.encode().len(), record.encoded_len());
            assert!(record.encoded_len() <= max_encoded_len(13));
        }
    }

    #[test]
    fn test_max_payload_for_budget() {
        assert_eq!(max_payload_for(22), 0);
        assert_eq!(max_payload_for(24), 1);
        assert_eq!(max_payload_for(0), 0);
        assert!(max_encoded_len(max_payload_for(1000)) <= 1000);
    }
}
