//! Response serialization.
//!
//! Turns a [`Response`] into wire bytes: status line, `Content-Type`,
//! `Content-Length` derived from the body variant, the remaining
//! headers (any second occurrence of the two managed headers is
//! skipped), a blank line, and the inline body. The headers-only
//! variant is used when the body is streamed from disk after the
//! header block.
//!
//! `Server` and `X-Powered-By` are filled in here when the response
//! does not already carry them.

use hearth_core::response::{Response, ResponseBody};

/// Value of the default `Server` header.
pub const SERVER_NAME_VERSION: &str = "hearth/0.1.0";
/// Value of the default `X-Powered-By` header.
pub const POWERED_BY_TEXT: &str = "hearth";

/// Serialize a full response. For stream bodies the returned bytes end
/// at the blank line; the file content follows on the socket.
#[must_use]
pub fn serialize(response: &Response) -> Vec<u8> {
    let mut wire = serialize_headers_only(response);
    if let ResponseBody::Bytes(body) = &response.body {
        wire.extend_from_slice(body);
    }
    wire
}

/// Serialize only the status line, headers and blank line.
#[must_use]
pub fn serialize_headers_only(response: &Response) -> Vec<u8> {
    let mut wire = Vec::with_capacity(256);

    wire.extend_from_slice(
        format!(
            "HTTP/1.1 {} {}\r\n",
            response.status.as_u16(),
            response.status.canonical_reason()
        )
        .as_bytes(),
    );
    wire.extend_from_slice(format!("Content-Type: {}\r\n", response.content_type).as_bytes());
    wire.extend_from_slice(
        format!("Content-Length: {}\r\n", response.body.content_length()).as_bytes(),
    );

    for (name, value) in response.headers.iter() {
        if name.eq_ignore_ascii_case("content-type") || name.eq_ignore_ascii_case("content-length")
        {
            continue;
        }
        wire.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }

    if !response.headers.contains("server") {
        wire.extend_from_slice(format!("Server: {SERVER_NAME_VERSION}\r\n").as_bytes());
    }
    if !response.headers.contains("x-powered-by") {
        wire.extend_from_slice(format!("X-Powered-By: {POWERED_BY_TEXT}\r\n").as_bytes());
    }

    wire.extend_from_slice(b"\r\n");
    wire
}
