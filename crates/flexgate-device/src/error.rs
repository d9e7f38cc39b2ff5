//! Error types for the device driver.

use std::io;

use flexgate_at_protocol::{AtError, SendFailure};
use thiserror::Error;

/// Errors that can occur while driving the transmitter.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The serial device could not be opened.
    #[error("Failed to open serial device {path}: {source}")]
    Open {
        /// Device path.
        path: String,
        /// Underlying error.
        source: io::Error,
    },

    /// The terminal settings could not be read or applied.
    #[error("Failed to configure serial device {path}: {source}")]
    Configure {
        /// Device path.
        path: String,
        /// Underlying error.
        source: io::Error,
    },

    /// The baud rate is not in the supported set.
    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    /// A write to the link failed.
    #[error("Serial I/O error: {0}")]
    Io(#[from] io::Error),

    /// An AT command did not succeed.
    #[error(transparent)]
    Command(#[from] AtError),

    /// The device never answered the handshake.
    #[error("Device did not respond after {attempts} handshake attempts")]
    InitializationFailed {
        /// Handshake attempts made.
        attempts: u32,
    },

    /// The binary send sequence failed on every attempt.
    #[error("Transmission failed after {attempts} attempts (last: {last})")]
    TransmissionFailed {
        /// Send attempts made.
        attempts: u32,
        /// Failure of the final attempt.
        last: SendFailure,
    },
}

impl DeviceError {
    /// Whether this is a transport failure (open/configure/I-O) rather than
    /// a protocol-level one.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DeviceError::Open { .. }
                | DeviceError::Configure { .. }
                | DeviceError::UnsupportedBaudRate(_)
                | DeviceError::Io(_)
        )
    }
}

/// Result type alias for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;
