//! FLEX pager addressing and frame encoding.
//!
//! This crate turns a text message and a numeric pager address (capcode) into
//! the binary frame that the FLEX-FSK-TX transmitter streams over the air.
//!
//! - [`classify_capcode`] / [`is_valid_capcode`]: the address rule
//! - [`PayloadEncoder`]: the seam the gateway encodes through
//! - [`FlexEncoder`]: a single-frame 1600 bps / 2-level alphanumeric encoder
//! - [`EncodedPayload`]: the bounded binary result

mod bch;
mod capcode;
mod encoder;
mod error;
mod payload;

pub use bch::*;
pub use capcode::*;
pub use encoder::*;
pub use error::*;
pub use payload::*;
