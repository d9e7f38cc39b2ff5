//! Error types for the AT protocol.

use thiserror::Error;

use crate::responses::ResponseOutcome;

/// Errors that can occur when working with the AT protocol.
#[derive(Debug, Error)]
pub enum AtError {
    /// Invalid command parameters.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A command did not succeed after exhausting its attempts.
    #[error("command '{command}' failed after {attempts} attempts (last outcome {outcome})")]
    RetriesExhausted {
        /// Command text without terminator.
        command: String,
        /// Attempts made.
        attempts: u32,
        /// Outcome of the final attempt.
        outcome: ResponseOutcome,
    },

    /// The device answered with something other than what the caller needed.
    #[error("unexpected response to '{command}': {outcome}")]
    UnexpectedResponse {
        /// Command text without terminator.
        command: String,
        /// Outcome that was received.
        outcome: ResponseOutcome,
    },
}

/// Result type alias for AT protocol operations.
pub type AtResult<T> = Result<T, AtError>;
