//! HTTP/1.1 request parser.
//!
//! A pure function from one complete request's bytes (header block
//! plus body) to a [`Request`] value. It never touches the network;
//! framing (finding the header terminator, reading the body to its
//! Content-Length) happens in the connection handler before the
//! parser runs.
//!
//! The parser is tolerant where tolerance is harmless (header lines
//! without a colon are skipped with a warning, unknown versions
//! default to HTTP/1.1) and strict where it matters (a malformed
//! `Range` header fails the whole request).

use std::fmt;

use hearth_core::log_warn;
use hearth_core::logging::LogContext;
use hearth_core::range::RangeSpec;
use hearth_core::request::{HttpVersion, Method, Request};

use crate::query::parse_params;

/// Request parsing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// No CRLF-terminated request line.
    MissingRequestLine,
    /// No blank line separating headers from body.
    MissingHeaderTerminator,
    /// Request line does not have method, target and version tokens.
    InvalidRequestLine,
    /// `Range` header present but not `bytes=<digits>-<digits?>`.
    InvalidRange,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRequestLine => write!(f, "missing request line"),
            Self::MissingHeaderTerminator => write!(f, "missing header terminator"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidRange => write!(f, "invalid Range header"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse one complete request.
///
/// `input` must contain the full header block (terminated by
/// `\r\n\r\n`) followed by the body bytes, if any.
///
/// # Errors
///
/// Returns a [`ParseError`] for a malformed request line, a missing
/// terminator, or a malformed `Range` header.
pub fn parse_request(input: &[u8], ctx: LogContext) -> Result<Request, ParseError> {
    let first_line_end = find(input, b"\r\n").ok_or(ParseError::MissingRequestLine)?;
    let headers_end = find(input, b"\r\n\r\n").ok_or(ParseError::MissingHeaderTerminator)?;

    let first_line = String::from_utf8_lossy(&input[..first_line_end]).into_owned();
    let method_end = first_line.find(' ').ok_or(ParseError::InvalidRequestLine)?;
    let path_end = first_line[method_end + 1..]
        .find(' ')
        .map(|pos| method_end + 1 + pos)
        .ok_or(ParseError::InvalidRequestLine)?;

    let mut request = Request::default();
    request.method = Method::parse(&first_line[..method_end]);

    let target = &first_line[method_end + 1..path_end];
    match target.split_once('?') {
        Some((path, query)) => {
            request.path = path.to_string();
            parse_params(query, &mut request.query_params, ctx);
        }
        None => request.path = target.to_string(),
    }

    request.version = HttpVersion::parse(&first_line[path_end + 1..]);

    let headers_block = String::from_utf8_lossy(&input[first_line_end + 2..headers_end]).into_owned();
    for line in headers_block.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        let Some((raw_key, raw_value)) = line.split_once(':') else {
            log_warn!(ctx, "malformed header line skipped");
            continue;
        };
        let key = raw_key.trim().to_ascii_lowercase();
        let value = raw_value.trim().to_string();

        if key == "range" {
            match RangeSpec::parse(&value) {
                Some(range) => request.range = Some(range),
                None => return Err(ParseError::InvalidRange),
            }
        }

        request.headers.set(key, value);
    }

    if headers_end + 4 < input.len() {
        request.body = input[headers_end + 4..].to_vec();

        if request.method == Method::Post {
            let is_form = request
                .headers
                .get("content-type")
                .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
            if is_form {
                let body = String::from_utf8_lossy(&request.body).into_owned();
                parse_params(&body, &mut request.form_params, ctx);
            }
        }
    }

    Ok(request)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
