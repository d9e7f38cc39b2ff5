//! Response classification for the AT protocol.
//!
//! A single AT exchange is summarised as one [`ResponseOutcome`]:
//! - `OK` / `ERROR`: exact terminal lines
//! - `DATA`: at least one `+key: value` line was seen, but no terminal line
//!   arrived before the read budget ran out
//! - `TIMEOUT`: nothing useful arrived before the read budget ran out
//! - `INVALID`: the transport failed while polling or reading
//!
//! Data lines are not terminal on their own: after `+SEND: READY` the device
//! normally follows with `OK`, and the parser keeps reading until it does.

use crate::codec::LineAssembler;
use crate::constants::{
    DATA_PREFIX, DEBUG_MARKER, MARKER_ERROR, MARKER_OK, READY_BANNER,
};

/// Classification of one received line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Exactly `OK`.
    Ok,
    /// Exactly `ERROR`.
    Error,
    /// Starts with `+`.
    Data,
    /// Contains `DEBUG:`.
    Debug,
    /// Contains `AT READY`.
    Ready,
    /// Anything else (echoes, banners, noise).
    Other,
}

/// Classify a complete line.
pub fn classify_line(line: &str) -> LineKind {
    if line == MARKER_OK {
        LineKind::Ok
    } else if line == MARKER_ERROR {
        LineKind::Error
    } else if line.starts_with(DATA_PREFIX) {
        LineKind::Data
    } else if line.contains(DEBUG_MARKER) {
        LineKind::Debug
    } else if line.contains(READY_BANNER) {
        LineKind::Ready
    } else {
        LineKind::Other
    }
}

/// Outcome of one AT exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseOutcome {
    /// Terminal `OK`.
    Ok,
    /// Terminal `ERROR`.
    Error,
    /// A data line without a terminal marker.
    Data,
    /// No terminal marker and no data before the budget expired.
    Timeout,
    /// I/O or polling failure.
    Invalid,
}

impl ResponseOutcome {
    /// Short uppercase name used in logs and metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseOutcome::Ok => "OK",
            ResponseOutcome::Error => "ERROR",
            ResponseOutcome::Data => "DATA",
            ResponseOutcome::Timeout => "TIMEOUT",
            ResponseOutcome::Invalid => "INVALID",
        }
    }
}

impl std::fmt::Display for ResponseOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified AT response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtResponse {
    /// The outcome.
    pub outcome: ResponseOutcome,
    /// The last data line seen during the exchange, if any.
    pub data_line: Option<String>,
}

impl AtResponse {
    /// A response with no data line.
    pub fn bare(outcome: ResponseOutcome) -> Self {
        AtResponse {
            outcome,
            data_line: None,
        }
    }

    /// Response for a transport failure.
    pub fn invalid() -> Self {
        Self::bare(ResponseOutcome::Invalid)
    }

    /// Whether the data line contains `marker`.
    pub fn data_contains(&self, marker: &str) -> bool {
        self.data_line
            .as_deref()
            .map(|line| line.contains(marker))
            .unwrap_or(false)
    }
}

/// Incremental parser that turns a byte stream into one [`AtResponse`].
#[derive(Debug, Default)]
pub struct ResponseParser {
    assembler: LineAssembler,
    data_line: Option<String>,
}

impl ResponseParser {
    /// Create a parser for a new exchange.
    pub fn new() -> Self {
        ResponseParser {
            assembler: LineAssembler::new(),
            data_line: None,
        }
    }

    /// Feed one byte. Returns the response once a terminal line is seen.
    pub fn feed(&mut self, byte: u8) -> Option<AtResponse> {
        let line = self.assembler.push(byte)?;
        log::trace!("AT <- {}", line.text);

        match classify_line(&line.text) {
            LineKind::Ok => Some(self.finish(ResponseOutcome::Ok)),
            LineKind::Error => Some(self.finish(ResponseOutcome::Error)),
            LineKind::Data => {
                if line.truncated {
                    log::warn!("dropping oversized data line ({} bytes kept)", line.text.len());
                } else {
                    self.data_line = Some(line.text);
                }
                None
            }
            LineKind::Debug => {
                log::debug!("device: {}", line.text);
                None
            }
            LineKind::Ready => {
                log::debug!("device ready banner: {}", line.text);
                None
            }
            LineKind::Other => None,
        }
    }

    /// The read budget ran out: report `DATA` if a data line was seen,
    /// otherwise `TIMEOUT`.
    pub fn expire(&mut self) -> AtResponse {
        if self.data_line.is_some() {
            self.finish(ResponseOutcome::Data)
        } else {
            self.finish(ResponseOutcome::Timeout)
        }
    }

    /// Data line seen so far, if any.
    pub fn data_line(&self) -> Option<&str> {
        self.data_line.as_deref()
    }

    fn finish(&mut self, outcome: ResponseOutcome) -> AtResponse {
        self.assembler.clear();
        AtResponse {
            outcome,
            data_line: self.data_line.take(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &[u8]) -> AtResponse {
        let mut parser = ResponseParser::new();
        for &b in data {
            if let Some(response) = parser.feed(b) {
                return response;
            }
        }
        parser.expire()
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line("OK"), LineKind::Ok);
        assert_eq!(classify_line("ERROR"), LineKind::Error);
        assert_eq!(classify_line("+SEND: READY"), LineKind::Data);
        assert_eq!(classify_line("DEBUG: tx start"), LineKind::Debug);
        assert_eq!(classify_line("AT READY"), LineKind::Ready);
        assert_eq!(classify_line("OK "), LineKind::Other);
        assert_eq!(classify_line("AT+FREQ=916.0000"), LineKind::Other);
    }

    #[test]
    fn test_ok_and_error() {
        assert_eq!(parse(b"OK\r\n").outcome, ResponseOutcome::Ok);
        assert_eq!(parse(b"ERROR\r\n").outcome, ResponseOutcome::Error);
    }

    #[test]
    fn test_silence_is_timeout() {
        let response = parse(b"");
        assert_eq!(response.outcome, ResponseOutcome::Timeout);
        assert!(response.data_line.is_none());
    }

    #[test]
    fn test_data_then_ok() {
        let response = parse(b"+SEND: READY\r\nOK\r\n");
        assert_eq!(response.outcome, ResponseOutcome::Ok);
        assert!(response.data_contains("+SEND: READY"));
    }

    #[test]
    fn test_data_without_terminal() {
        let response = parse(b"+SEND: READY\r\n");
        assert_eq!(response.outcome, ResponseOutcome::Data);
        assert_eq!(response.data_line.as_deref(), Some("+SEND: READY"));
    }

    #[test]
    fn test_informational_lines_skipped() {
        let response = parse(b"AT READY\r\nDEBUG: booting\r\nnoise\r\nOK\r\n");
        assert_eq!(response.outcome, ResponseOutcome::Ok);
        assert!(response.data_line.is_none());
    }

    #[test]
    fn test_last_data_line_wins() {
        let response = parse(b"+A: 1\r\n+B: 2\r\nERROR\r\n");
        assert_eq!(response.outcome, ResponseOutcome::Error);
        assert_eq!(response.data_line.as_deref(), Some("+B: 2"));
    }

    #[test]
    fn test_oversized_data_line_dropped() {
        let mut data = b"+".to_vec();
        data.extend(std::iter::repeat(b'x').take(2000));
        data.extend_from_slice(b"\r\nOK\r\n");
        let response = parse(&data);
        assert_eq!(response.outcome, ResponseOutcome::Ok);
        assert!(response.data_line.is_none());
    }

    #[test]
    fn test_outcome_names() {
        assert_eq!(ResponseOutcome::Timeout.to_string(), "TIMEOUT");
        assert_eq!(ResponseOutcome::Invalid.as_str(), "INVALID");
    }
}
