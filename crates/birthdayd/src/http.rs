//! HTTP/1.1 request parser and response serializer
//!
//! Covers what the daemon needs: request line, headers, and skipping a
//! `Content-Length` body. No chunked bodies.

use bytes::{Buf, BytesMut};
use std::fmt;

/// Maximum request line + headers size (8 KiB)
const MAX_HEAD_SIZE: usize = 8 * 1024;

/// Maximum number of request headers
const MAX_HEADERS: usize = 64;

/// Maximum request body size (64 KiB); bodies are read and discarded
const MAX_BODY_SIZE: usize = 64 * 1024;

/// HTTP protocol version of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    /// HTTP/1.0: connections close unless asked otherwise
    Http10,
    /// HTTP/1.1: connections persist unless asked otherwise
    Http11,
}

/// A parsed request head
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    /// Path without the query string
    pub path: String,
    pub version: Version,
    pub headers: Vec<(String, String)>,
}

/// Reasons a request cannot be parsed
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Syntax error in the request head
    Malformed(String),
    /// Request line + headers exceed the limit
    HeadTooLarge,
    /// Declared body exceeds the limit
    BodyTooLarge(usize),
}

impl ParseError {
    /// Status code to answer with
    pub fn status(&self) -> u16 {
        match self {
            ParseError::Malformed(_) => 400,
            ParseError::HeadTooLarge => 431,
            ParseError::BodyTooLarge(_) => 413,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Malformed(msg) => write!(f, "malformed request: {}", msg),
            ParseError::HeadTooLarge => {
                write!(f, "request head too large (max: {} bytes)", MAX_HEAD_SIZE)
            }
            ParseError::BodyTooLarge(len) => write!(
                f,
                "request body too large: {} bytes (max: {} bytes)",
                len, MAX_BODY_SIZE
            ),
        }
    }
}

impl std::error::Error for ParseError {}

impl Request {
    /// Parse one request from the buffer
    ///
    /// Returns `Ok(None)` until the full head (and declared body) is buffered;
    /// on success the request's bytes are consumed from `buf`.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<Request>, ParseError> {
        let head_end = match find_head_end(buf) {
            Some(end) => end,
            None if buf.len() > MAX_HEAD_SIZE => return Err(ParseError::HeadTooLarge),
            None => return Ok(None), // Need more data
        };
        if head_end > MAX_HEAD_SIZE {
            return Err(ParseError::HeadTooLarge);
        }

        let head = std::str::from_utf8(&buf[..head_end - 4])
            .map_err(|_| ParseError::Malformed("head is not valid UTF-8".to_string()))?;
        let mut lines = head.split("\r\n");

        let request_line = lines.next().unwrap_or_default();
        let (method, target, version) = parse_request_line(request_line)?;

        let mut headers = Vec::new();
        for line in lines {
            if headers.len() == MAX_HEADERS {
                return Err(ParseError::Malformed("too many headers".to_string()));
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ParseError::Malformed(format!("invalid header line {:?}", line)))?;
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(ParseError::Malformed(format!("invalid header name {:?}", name)));
            }
            headers.push((name.to_string(), value.trim().to_string()));
        }

        let path = match target.split_once('?') {
            Some((path, _query)) => path,
            None => target,
        };

        let request = Request {
            method: method.to_string(),
            path: path.to_string(),
            version,
            headers,
        };

        if request.header("transfer-encoding").is_some() {
            return Err(ParseError::Malformed("transfer-encoding is not supported".to_string()));
        }

        let body_len = match request.header("content-length") {
            Some(value) => value
                .parse::<usize>()
                .map_err(|_| ParseError::Malformed(format!("invalid content-length {:?}", value)))?,
            None => 0,
        };
        if body_len > MAX_BODY_SIZE {
            return Err(ParseError::BodyTooLarge(body_len));
        }
        if buf.len() < head_end + body_len {
            return Ok(None); // Body not fully buffered yet
        }

        buf.advance(head_end + body_len);
        Ok(Some(request))
    }

    /// Look up a header value, ignoring name case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the connection should stay open after answering
    pub fn keep_alive(&self) -> bool {
        match self.header("connection") {
            Some(v) if v.eq_ignore_ascii_case("close") => false,
            Some(v) if v.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version == Version::Http11,
        }
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn parse_request_line(line: &str) -> Result<(&str, &str, Version), ParseError> {
    let mut parts = line.split(' ');
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v), None) if !m.is_empty() && !t.is_empty() => (m, t, v),
        _ => {
            return Err(ParseError::Malformed(format!("invalid request line {:?}", line)));
        }
    };

    let version = match version {
        "HTTP/1.1" => Version::Http11,
        "HTTP/1.0" => Version::Http10,
        other => {
            return Err(ParseError::Malformed(format!("unsupported version {:?}", other)));
        }
    };

    Ok((method, target, version))
}

/// A response ready to serialize
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: u16,
    headers: Vec<(&'static str, String)>,
    body: Vec<u8>,
    /// Answer to a HEAD request: headers describe `body` but it is not sent
    head_only: bool,
}

impl Response {
    /// Plain-text response; a trailing newline is added to the body
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let mut body = body.into();
        body.push('\n');
        Self {
            status,
            headers: vec![("Content-Type", "text/plain; charset=utf-8".to_string())],
            body: body.into_bytes(),
            head_only: false,
        }
    }

    /// JSON response from an already encoded body
    pub fn json(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type", "application/json".to_string())],
            body,
            head_only: false,
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Keep the headers, including `Content-Length`, but send no body
    pub fn without_body(mut self) -> Self {
        self.head_only = true;
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Serialize to HTTP/1.1 wire format
    pub fn serialize(&self, keep_alive: bool) -> Vec<u8> {
        let mut result = format!("HTTP/1.1 {} {}\r\n", self.status, reason(self.status)).into_bytes();
        for (name, value) in &self.headers {
            result.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        result.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        let connection = if keep_alive { "keep-alive" } else { "close" };
        result.extend_from_slice(format!("Connection: {}\r\n\r\n", connection).as_bytes());
        if !self.head_only {
            result.extend_from_slice(&self.body);
        }
        result
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
