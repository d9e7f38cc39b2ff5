//! The encoded on-air payload.

use crate::error::{FlexError, FlexResult};

/// Maximum size of an encoded payload in bytes.
pub const MAX_PAYLOAD_SIZE: usize = 1024;

/// A binary frame ready to be streamed to the transmitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    bytes: Vec<u8>,
}

impl EncodedPayload {
    /// Wrap raw bytes, enforcing [`MAX_PAYLOAD_SIZE`].
    pub fn new(bytes: Vec<u8>) -> FlexResult<Self> {
        if bytes.len() > MAX_PAYLOAD_SIZE {
            return Err(FlexError::PayloadTooLarge {
                size: bytes.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(EncodedPayload { bytes })
    }

    /// The payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex dump, 16 bytes per line, each line prefixed with its offset.
    pub fn hex_dump(&self) -> String {
        self.bytes
            .chunks(16)
            .enumerate()
            .map(|(i, row)| format!("{:04x}: {}", i * 16, hex::encode(row)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl AsRef<[u8]> for EncodedPayload {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}
