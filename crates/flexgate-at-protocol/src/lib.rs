//! FLEX-FSK-TX AT Protocol
//!
//! This crate provides types and utilities for talking to a FLEX paging
//! transmitter over its serial AT command interface. It contains no I/O:
//! everything here is a pure function or state machine, so the byte handling
//! can be tested without a device attached.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → device): ASCII lines terminated with `\r\n`
//!   (`AT`, `AT+FREQ=916.0000`, `AT+POWER=10`, `AT+SEND=123`)
//! - **Responses** (device → host): lines terminated with `\n`; `\r` is ignored
//! - **Terminal markers**: `OK` or `ERROR` end an exchange
//! - **Data lines**: `+<key>: <value>`, followed by a terminal marker
//! - **Informational lines**: `DEBUG:` and `AT READY`, logged and skipped
//!
//! After `AT+SEND=<n>` the device answers `+SEND: READY`, the host streams
//! exactly `n` raw bytes, and the device answers `OK` once the frame has been
//! put on the air.
//!
//! # Example
//!
//! ```rust
//! use flexgate_at_protocol::{AtCommand, ResponseOutcome, ResponseParser};
//!
//! let cmd = AtCommand::SetPower { level: 10 };
//! assert_eq!(cmd.encode(), b"AT+POWER=10\r\n");
//!
//! let mut parser = ResponseParser::new();
//! let mut result = None;
//! for &byte in b"+SEND: READY\r\nOK\r\n" {
//!     if let Some(response) = parser.feed(byte) {
//!         result = Some(response);
//!         break;
//!     }
//! }
//! let response = result.unwrap();
//! assert_eq!(response.outcome, ResponseOutcome::Ok);
//! assert_eq!(response.data_line.as_deref(), Some("+SEND: READY"));
//! ```

mod codec;
mod commands;
mod constants;
mod error;
mod policy;
mod responses;

pub use codec::*;
pub use commands::*;
pub use constants::*;
pub use error::*;
pub use policy::*;
pub use responses::*;
