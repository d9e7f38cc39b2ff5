//! Commands understood by the FLEX-FSK-TX firmware.

use crate::constants::{MAX_POWER, MIN_POWER};
use crate::error::{AtError, AtResult};

/// Command line terminator.
pub const COMMAND_TERMINATOR: &str = "\r\n";

/// An AT command.
#[derive(Debug, Clone, PartialEq)]
pub enum AtCommand {
    /// Bare `AT` ping.
    Attention,
    /// `AT+FREQ=<MHz>`, always written with four decimals.
    SetFrequency {
        /// Frequency in MHz.
        mhz: f64,
    },
    /// `AT+POWER=<level>`.
    SetPower {
        /// Transmit power level (2-20).
        level: u8,
    },
    /// `AT+SEND=<length>`: arm the binary transfer of `length` bytes.
    Send {
        /// Number of payload bytes that will follow.
        length: usize,
    },
    /// Any other command line, sent as-is.
    Raw(String),
}

impl AtCommand {
    /// Frequency command from a value in Hz.
    pub fn frequency_hz(hz: u64) -> Self {
        AtCommand::SetFrequency {
            mhz: hz as f64 / 1_000_000.0,
        }
    }

    /// Power command, checking the accepted range.
    pub fn power(level: u8) -> AtResult<Self> {
        if !(MIN_POWER..=MAX_POWER).contains(&level) {
            return Err(AtError::InvalidCommand(format!(
                "power {} outside {}-{}",
                level, MIN_POWER, MAX_POWER
            )));
        }
        Ok(AtCommand::SetPower { level })
    }

    /// The command text without terminator.
    pub fn to_command_string(&self) -> String {
        match self {
            AtCommand::Attention => "AT".to_string(),
            AtCommand::SetFrequency { mhz } => format!("AT+FREQ={:.4}", mhz),
            AtCommand::SetPower { level } => format!("AT+POWER={}", level),
            AtCommand::Send { length } => format!("AT+SEND={}", length),
            AtCommand::Raw(text) => text.clone(),
        }
    }

    /// Encode for transmission, including the `\r\n` terminator.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.to_command_string().into_bytes();
        buf.extend_from_slice(COMMAND_TERMINATOR.as_bytes());
        buf
    }
}

impl std::fmt::Display for AtCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_command_string())
    }
}
