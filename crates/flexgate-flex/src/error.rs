//! Error types for flexgate-flex.

use thiserror::Error;

/// Errors that can occur while encoding a FLEX frame.
#[derive(Debug, Error)]
pub enum FlexError {
    /// The message text was empty.
    #[error("Message is empty")]
    EmptyMessage,

    /// The capcode is reserved or out of range.
    #[error("Invalid capcode: {0}")]
    InvalidCapcode(u64),

    /// The message does not fit in one frame.
    #[error("Message too long: {len} characters (max {max})")]
    MessageTooLong {
        /// Characters in the message.
        len: usize,
        /// Characters that fit with this address.
        max: usize,
    },

    /// The encoded frame exceeds the payload buffer.
    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Actual size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },
}

impl FlexError {
    /// Negative numeric code reported in logs.
    pub fn code(&self) -> i32 {
        match self {
            FlexError::EmptyMessage => -1,
            FlexError::InvalidCapcode(_) => -2,
            FlexError::MessageTooLong { .. } => -3,
            FlexError::PayloadTooLarge { .. } => -4,
        }
    }
}

/// Result type alias for FLEX encoding.
pub type FlexResult<T> = Result<T, FlexError>;
