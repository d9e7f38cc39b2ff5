//! HTTP/JSON front end.
//!
//! One request per connection: `POST` with basic auth and a JSON body
//! `{"capcode": <uint>, "message": <string>, "frequency": <uint, optional>}`.
//! Every reply is JSON and carries `Connection: close`.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use flexgate_metrics::{labels, metric_defs, metrics};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::auth::CredentialStore;
use crate::pipeline::PagingRequest;
use crate::server::{Frontend, ServerContext};

/// Read chunk size.
pub const HTTP_BUFFER_SIZE: usize = 8192;

/// Upper bound on the request head.
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Upper bound on the body read for a declared `Content-Length`.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Realm advertised in `WWW-Authenticate`.
pub const AUTH_REALM: &str = "FLEX Paging Gateway";

/// Request read failures. All are answered with 400.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The peer closed before sending anything.
    #[error("Connection closed before a request arrived")]
    Empty,

    /// No header terminator within [`MAX_HEADER_BYTES`].
    #[error("Request head exceeds {0} bytes")]
    HeadersTooLarge(usize),

    /// The request did not arrive within the read timeout.
    #[error("No complete request within {0:?}")]
    Timeout(Duration),

    /// Socket error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

// ============================================================================
// Requests
// ============================================================================

/// A parsed HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method, e.g. `POST`.
    pub method: String,
    /// Request target.
    pub path: String,
    /// Protocol version.
    pub version: String,
    /// Headers keyed by lowercase name.
    pub headers: HashMap<String, String>,
    /// Body text.
    pub body: String,
}

impl HttpRequest {
    /// Parse a raw request. Missing parts are left empty.
    pub fn parse(raw: &str) -> Self {
        let (head, body) = match raw.find("\r\n\r\n") {
            Some(i) => (&raw[..i], &raw[i + 4..]),
            None => (raw, ""),
        };

        let mut request = HttpRequest {
            body: body.to_string(),
            ..Default::default()
        };
        let mut lines = head.lines();
        if let Some(line) = lines.next() {
            let mut parts = line.split_whitespace();
            request.method = parts.next().unwrap_or_default().to_string();
            request.path = parts.next().unwrap_or_default().to_string();
            request.version = parts.next().unwrap_or_default().to_string();
        }
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                request
                    .headers
                    .insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }
        request
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// `Content-Length` from a request head, if present and numeric.
pub fn content_length(head: &str) -> Option<usize> {
    head.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

fn header_end(data: &[u8]) -> Option<usize> {
    data.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Read one request: the head, then the body up to the declared
/// `Content-Length` or until the peer stops sending.
pub async fn read_request<R>(reader: &mut R) -> Result<String, HttpError>
where
    R: AsyncRead + Unpin,
{
    let mut data = Vec::with_capacity(HTTP_BUFFER_SIZE);
    let mut chunk = vec![0u8; HTTP_BUFFER_SIZE];

    let head_len = loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if data.is_empty() {
                return Err(HttpError::Empty);
            }
            break None;
        }
        data.extend_from_slice(&chunk[..n]);
        if let Some(end) = header_end(&data) {
            break Some(end);
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(HttpError::HeadersTooLarge(MAX_HEADER_BYTES));
        }
    };

    if let Some(head_len) = head_len {
        let declared = content_length(&String::from_utf8_lossy(&data[..head_len])).unwrap_or(0);
        let wanted = head_len + declared.min(MAX_BODY_BYTES);
        while data.len() < wanted {
            match reader.read(&mut chunk).await {
                Ok(0) => {
                    debug!("HTTP: peer closed with {}/{} body bytes", data.len() - head_len, declared);
                    break;
                }
                Ok(n) => data.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    debug!("HTTP: body read failed: {}", e);
                    break;
                }
            }
        }
    }

    Ok(String::from_utf8_lossy(&data).into_owned())
}

/// JSON body of a paging request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageMessage {
    /// Pager address; 0 counts as missing.
    pub capcode: u64,
    /// Message text; empty counts as missing.
    pub message: String,
    /// Frequency in Hz; absent or 0 selects the default.
    #[serde(default)]
    pub frequency: u64,
}

/// Check method, credentials, and body. Returns the page to send or the
/// response to reject it with.
pub fn admit(
    request: &HttpRequest,
    credentials: &CredentialStore,
) -> Result<PagingRequest, HttpResponse> {
    if request.method != "POST" {
        return Err(HttpResponse::error(405, "Only POST method is allowed"));
    }

    let authorized = request
        .header("authorization")
        .is_some_and(|value| credentials.authenticate(value));
    if !authorized {
        return Err(HttpResponse::unauthorized());
    }

    let page: PageMessage = serde_json::from_str(&request.body).map_err(|e| {
        debug!("HTTP: body rejected ({}): {:?}", e, request.body);
        HttpResponse::error(400, "Invalid JSON format or missing required fields")
    })?;

    if page.capcode == 0 {
        return Err(HttpResponse::error(
            400,
            "Missing required field: capcode must be specified",
        ));
    }
    if page.message.is_empty() {
        return Err(HttpResponse::error(
            400,
            "Missing required field: message must be specified",
        ));
    }

    Ok(PagingRequest::new(page.capcode, page.message, page.frequency))
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    code: u16,
}

#[derive(Serialize)]
struct SuccessBody {
    status: &'static str,
    message: &'static str,
}

/// A JSON response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Extra headers beyond the standard three.
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: String,
}

impl HttpResponse {
    fn json<T: Serialize>(status: u16, body: &T) -> Self {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: serde_json::to_string(body).unwrap_or_default(),
        }
    }

    /// `{"error": message, "code": status}`.
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(
            status,
            &ErrorBody {
                error: message,
                code: status,
            },
        )
    }

    /// 200 after a transmission.
    pub fn success() -> Self {
        Self::json(
            200,
            &SuccessBody {
                status: "success",
                message: "Message transmitted successfully",
            },
        )
    }

    /// 401 with a basic-auth challenge.
    pub fn unauthorized() -> Self {
        let mut response = Self::error(401, "Authentication required");
        response.headers.push((
            "WWW-Authenticate".to_string(),
            format!("Basic realm=\"{}\"", AUTH_REALM),
        ));
        response
    }

    /// Reason phrase for the status line.
    pub fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            401 => "Unauthorized",
            405 => "Method Not Allowed",
            500 => "Internal Server Error",
            _ => "Unknown",
        }
    }

    /// Serialized response.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason());
        for (name, value) in &self.headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        out.push_str("Content-Type: application/json\r\n");
        out.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        out.push_str("Connection: close\r\n\r\n");
        out.push_str(&self.body);
        out.into_bytes()
    }
}

/// Serve one HTTP client.
pub async fn serve_client(mut stream: TcpStream, context: Arc<ServerContext>) -> io::Result<()> {
    let limit = context.read_timeout();
    let read = match tokio::time::timeout(limit, read_request(&mut stream)).await {
        Ok(read) => read,
        Err(_) => Err(HttpError::Timeout(limit)),
    };
    let (response, status) = match read {
        Err(e) => {
            debug!("HTTP: failed to read request: {}", e);
            (HttpResponse::error(400, "Failed to read request"), "rejected")
        }
        Ok(raw) => {
            let request = HttpRequest::parse(&raw);
            debug!(
                "HTTP: {} {} {} ({} headers, {} body bytes)",
                request.method,
                request.path,
                request.version,
                request.headers.len(),
                request.body.len()
            );
            match admit(&request, context.credentials()) {
                Err(response) if response.status == 401 => (response, "unauthorized"),
                Err(response) => (response, "rejected"),
                Ok(page) => match context.submit(Frontend::Http, page).await {
                    Ok(_) => (HttpResponse::success(), "success"),
                    Err(e) => (
                        HttpResponse::error(500, "Failed to process message"),
                        e.status(),
                    ),
                },
            }
        }
    };

    debug!("HTTP: {} {}", response.status, response.body);
    metrics::counter!(
        metric_defs::REQUESTS.name,
        &labels::request(Frontend::Http.as_str(), status)
    )
    .increment(1);

    stream.write_all(&response.to_bytes()).await?;
    stream.shutdown().await
}
