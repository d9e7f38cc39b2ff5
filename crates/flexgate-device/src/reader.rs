//! Reads one classified AT response from a port.

use std::io;

use flexgate_at_protocol::{AtResponse, ReadBudget, ResponseParser, POLL_SLICE};
use tracing::{debug, trace};

use crate::port::AtPort;

/// Read bytes until a terminal line arrives or the read budget expires.
///
/// Polls in [`POLL_SLICE`] steps and reads one byte at a time so nothing after
/// the terminal line is consumed. Poll or read failures yield `INVALID`.
pub fn read_response<P: AtPort + ?Sized>(port: &mut P) -> AtResponse {
    let mut parser = ResponseParser::new();
    let mut budget = ReadBudget::new();
    let mut byte = [0u8; 1];

    while !budget.expired() {
        match port.poll_readable(POLL_SLICE) {
            Ok(true) => {}
            Ok(false) => {
                budget.on_empty_slice();
                continue;
            }
            Err(e) => {
                debug!("AT read: poll failed: {}", e);
                return AtResponse::invalid();
            }
        }

        match port.read(&mut byte) {
            Ok(0) => budget.on_empty_slice(),
            Ok(_) => {
                budget.on_byte();
                if let Some(response) = parser.feed(byte[0]) {
                    trace!("AT read: {}", response.outcome);
                    return response;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                debug!("AT read: read failed: {}", e);
                return AtResponse::invalid();
            }
        }
    }

    let response = parser.expire();
    trace!(
        "AT read: budget expired with {} (data: {:?})",
        response.outcome,
        response.data_line
    );
    response
}
