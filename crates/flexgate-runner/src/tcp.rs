//! Raw TCP front end.
//!
//! A client sends one `CAPCODE|MESSAGE|FREQUENCY_HZ` line, receives a short
//! plain-text reply, and the connection is closed. The message may itself
//! contain `|`: the request is split on the first and last separator.

use std::io;
use std::sync::Arc;

use flexgate_metrics::{labels, metric_defs, metrics};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::pipeline::PagingRequest;
use crate::server::{Frontend, ServerContext};

/// Bytes read from a client; the request must arrive in one read.
pub const TCP_BUFFER_SIZE: usize = 2048;

/// Reply after a successful transmission.
pub const REPLY_SUCCESS: &str = "Message sent successfully!";
/// Reply when the pipeline fails.
pub const REPLY_FAILURE: &str = "Failed to process message";
/// Reply when the line does not have three fields.
pub const REPLY_BAD_FORMAT: &str = "Invalid input format. Expected: CAPCODE|MESSAGE|FREQUENCY";
/// Reply when the capcode or frequency is not a number.
pub const REPLY_BAD_NUMBER: &str = "Invalid capcode or frequency format";

/// A malformed request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TcpRequestError {
    /// Fewer than two `|` separators.
    #[error("{}", REPLY_BAD_FORMAT)]
    Format,
    /// Capcode or frequency field is not an unsigned integer.
    #[error("{}", REPLY_BAD_NUMBER)]
    Number,
}

impl TcpRequestError {
    /// Text sent back to the client.
    pub fn reply(&self) -> &'static str {
        match self {
            TcpRequestError::Format => REPLY_BAD_FORMAT,
            TcpRequestError::Number => REPLY_BAD_NUMBER,
        }
    }
}

/// Parse `CAPCODE|MESSAGE|FREQUENCY_HZ`.
///
/// Whitespace around the numeric fields is ignored (clients usually send a
/// trailing newline); the message is kept verbatim.
pub fn parse_request(input: &str) -> Result<PagingRequest, TcpRequestError> {
    let (first, last) = match (input.find('|'), input.rfind('|')) {
        (Some(first), Some(last)) if first != last => (first, last),
        _ => return Err(TcpRequestError::Format),
    };

    let capcode = input[..first]
        .trim()
        .parse()
        .map_err(|_| TcpRequestError::Number)?;
    let frequency_hz = input[last + 1..]
        .trim()
        .parse()
        .map_err(|_| TcpRequestError::Number)?;

    Ok(PagingRequest::new(
        capcode,
        &input[first + 1..last],
        frequency_hz,
    ))
}

/// Serve one raw TCP client.
pub async fn serve_client(mut stream: TcpStream, context: Arc<ServerContext>) -> io::Result<()> {
    let mut buf = [0u8; TCP_BUFFER_SIZE];
    let limit = context.read_timeout();
    let n = match tokio::time::timeout(limit, stream.read(&mut buf)).await {
        Ok(read) => read?,
        Err(_) => {
            debug!("TCP: no request within {:?}, closing", limit);
            return Ok(());
        }
    };
    if n == 0 {
        debug!("TCP: client closed without sending a request");
        return Ok(());
    }

    let input = String::from_utf8_lossy(&buf[..n]).into_owned();
    debug!("TCP: received {:?}", input);

    let (reply, status) = match parse_request(&input) {
        Err(e) => (e.reply(), "rejected"),
        Ok(request) => match context.submit(Frontend::Tcp, request).await {
            Ok(_) => (REPLY_SUCCESS, "success"),
            Err(e) => (REPLY_FAILURE, e.status()),
        },
    };
    metrics::counter!(
        metric_defs::REQUESTS.name,
        &labels::request(Frontend::Tcp.as_str(), status)
    )
    .increment(1);

    stream.write_all(reply.as_bytes()).await?;
    stream.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_three_fields() {
        let request = parse_request("1122334|Hello|916000000").unwrap();
        assert_eq!(request, PagingRequest::new(1_122_334, "Hello", 916_000_000));
    }

    #[test]
    fn test_message_may_contain_separator() {
        let request = parse_request("1234|a|b|c|929612500\n").unwrap();
        assert_eq!(request.message, "a|b|c");
        assert_eq!(request.frequency_hz, 929_612_500);
    }

    #[test]
    fn test_trailing_newline_and_spaces() {
        let request = parse_request(" 1234 | spaced message |916000000\r\n").unwrap();
        assert_eq!(request.capcode, 1234);
        assert_eq!(request.message, " spaced message ");
    }

    #[test]
    fn test_missing_separators() {
        assert_eq!(parse_request("1234|Hello"), Err(TcpRequestError::Format));
        assert_eq!(parse_request("no separators"), Err(TcpRequestError::Format));
        assert_eq!(
            TcpRequestError::Format.to_string(),
            "Invalid input format. Expected: CAPCODE|MESSAGE|FREQUENCY"
        );
    }

    #[test]
    fn test_non_numeric_fields() {
        assert_eq!(parse_request("abc|Hello|916000000"), Err(TcpRequestError::Number));
        assert_eq!(parse_request("1234|Hello|"), Err(TcpRequestError::Number));
        assert_eq!(parse_request("-5|Hello|916000000"), Err(TcpRequestError::Number));
        assert_eq!(
            TcpRequestError::Number.reply(),
            "Invalid capcode or frequency format"
        );
    }

    #[test]
    fn test_empty_message_parses() {
        // Rejected later by the pipeline
        let request = parse_request("1234||916000000").unwrap();
        assert!(request.message.is_empty());
    }
}
