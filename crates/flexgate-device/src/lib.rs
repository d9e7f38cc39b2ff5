//! Serial driver for FLEX-FSK-TX paging transmitters.
//!
//! Layers, bottom up:
//!
//! - [`SerialLink`]: the tty, opened exclusively in raw 8N1 mode, settings
//!   restored on drop
//! - [`AtPort`]: the byte operations the protocol needs, implemented by
//!   [`SerialLink`] and, with the `test-util` feature, by the in-memory
//!   `ScriptedPort`
//! - [`read_response`]: one classified response per read
//! - [`CommandExecutor`]: one command with policy-driven retries
//! - [`DeviceInitializer`]: the boot handshake
//! - [`MessageTransmitter`]: radio configuration and the chunked binary send

mod error;
mod executor;
mod initializer;
mod port;
mod reader;
#[cfg(any(test, feature = "test-util"))]
mod scripted;
mod serial;
mod transmitter;

pub use error::*;
pub use executor::*;
pub use initializer::*;
pub use port::*;
pub use reader::*;
#[cfg(any(test, feature = "test-util"))]
pub use scripted::*;
pub use serial::*;
pub use transmitter::*;
