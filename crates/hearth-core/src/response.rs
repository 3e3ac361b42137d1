//! HTTP response types.

use std::path::PathBuf;

use serde::Serialize;

use crate::headers::HeaderMap;

/// HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    // Informational
    /// 100 Continue
    pub const CONTINUE: Self = Self(100);
    /// 101 Switching Protocols
    pub const SWITCHING_PROTOCOLS: Self = Self(101);
    /// 102 Processing
    pub const PROCESSING: Self = Self(102);

    // Success
    /// 200 OK
    pub const OK: Self = Self(200);
    /// 201 Created
    pub const CREATED: Self = Self(201);
    /// 202 Accepted
    pub const ACCEPTED: Self = Self(202);
    /// 204 No Content
    pub const NO_CONTENT: Self = Self(204);
    /// 206 Partial Content
    pub const PARTIAL_CONTENT: Self = Self(206);

    // Redirection
    /// 301 Moved Permanently
    pub const MOVED_PERMANENTLY: Self = Self(301);
    /// 302 Found
    pub const FOUND: Self = Self(302);
    /// 303 See Other
    pub const SEE_OTHER: Self = Self(303);
    /// 304 Not Modified
    pub const NOT_MODIFIED: Self = Self(304);
    /// 307 Temporary Redirect
    pub const TEMPORARY_REDIRECT: Self = Self(307);
    /// 308 Permanent Redirect
    pub const PERMANENT_REDIRECT: Self = Self(308);

    // Client errors
    /// 400 Bad Request
    pub const BAD_REQUEST: Self = Self(400);
    /// 401 Unauthorized
    pub const UNAUTHORIZED: Self = Self(401);
    /// 403 Forbidden
    pub const FORBIDDEN: Self = Self(403);
    /// 404 Not Found
    pub const NOT_FOUND: Self = Self(404);
    /// 405 Method Not Allowed
    pub const METHOD_NOT_ALLOWED: Self = Self(405);
    /// 409 Conflict
    pub const CONFLICT: Self = Self(409);
    /// 413 Payload Too Large
    pub const PAYLOAD_TOO_LARGE: Self = Self(413);
    /// 415 Unsupported Media Type
    pub const UNSUPPORTED_MEDIA_TYPE: Self = Self(415);
    /// 416 Range Not Satisfiable
    pub const RANGE_NOT_SATISFIABLE: Self = Self(416);
    /// 429 Too Many Requests
    pub const TOO_MANY_REQUESTS: Self = Self(429);

    // Server errors
    /// 500 Internal Server Error
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);
    /// 501 Not Implemented
    pub const NOT_IMPLEMENTED: Self = Self(501);
    /// 502 Bad Gateway
    pub const BAD_GATEWAY: Self = Self(502);
    /// 503 Service Unavailable
    pub const SERVICE_UNAVAILABLE: Self = Self(503);
    /// 504 Gateway Timeout
    pub const GATEWAY_TIMEOUT: Self = Self(504);
    /// 505 HTTP Version Not Supported
    pub const HTTP_VERSION_NOT_SUPPORTED: Self = Self(505);

    /// Create a status code from its numeric value.
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        Self(code)
    }

    /// Get the numeric value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Get the canonical reason phrase.
    #[must_use]
    pub const fn canonical_reason(self) -> &'static str {
        match self.0 {
            100 => "Continue",
            101 => "Switching Protocols",
            102 => "Processing",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            206 => "Partial Content",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            409 => "Conflict",
            413 => "Payload Too Large",
            415 => "Unsupported Media Type",
            416 => "Range Not Satisfiable",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            505 => "HTTP Version Not Supported",
            _ => "Unknown",
        }
    }
}

/// Describes a file region to be written from disk without buffering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    /// Path of the file to stream.
    pub path: PathBuf,
    /// Number of bytes to send.
    pub total_bytes: u64,
    /// Byte offset to start from.
    pub offset: u64,
}

/// Response body: either inline bytes or a file region streamed from
/// disk. A response carries exactly one representation.
#[derive(Debug, Clone)]
pub enum ResponseBody {
    /// Buffered body bytes.
    Bytes(Vec<u8>),
    /// File region written from disk in bounded chunks.
    Stream(StreamDescriptor),
}

impl ResponseBody {
    /// Byte count the `Content-Length` header advertises for this body.
    #[must_use]
    pub fn content_length(&self) -> u64 {
        match self {
            Self::Bytes(bytes) => bytes.len() as u64,
            Self::Stream(descriptor) => descriptor.total_bytes,
        }
    }
}

/// An HTTP response ready for serialization.
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code.
    pub status: StatusCode,
    /// Value of the `Content-Type` header.
    pub content_type: String,
    /// Additional headers.
    pub headers: HeaderMap,
    /// Body representation.
    pub body: ResponseBody,
}

impl Response {
    /// Create a response with an inline body.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            headers: HeaderMap::new(),
            body: ResponseBody::Bytes(body.into()),
        }
    }

    /// Create a response whose body is streamed from a file region.
    #[must_use]
    pub fn stream(
        status: StatusCode,
        descriptor: StreamDescriptor,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            headers: HeaderMap::new(),
            body: ResponseBody::Stream(descriptor),
        }
    }

    /// Create a 200 response with a plain-text body.
    #[must_use]
    pub fn text(body: impl Into<Vec<u8>>) -> Self {
        Self::new(StatusCode::OK, body, "text/plain")
    }

    /// Create a 200 response with a JSON body.
    ///
    /// Serialization failures degrade to a 500 with a JSON error
    /// payload rather than propagating.
    #[must_use]
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => Self::new(StatusCode::OK, bytes, "application/json"),
            Err(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"error":"Serialization failed"}"#.to_vec(),
                "application/json",
            ),
        }
    }

    /// Create a JSON `{"error": message}` response with the given status.
    #[must_use]
    pub fn json_error(status: StatusCode, message: &str) -> Self {
        let body = serde_json::json!({ "error": message });
        Self::new(status, body.to_string().into_bytes(), "application/json")
    }

    /// Set a header (builder style).
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Set a header in place.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }
}

/// MIME type for a file extension (with leading dot, case-insensitive).
///
/// Unknown extensions fall back to `application/octet-stream`.
#[must_use]
pub fn mime_type_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        ".html" => "text/html",
        ".css" => "text/css",
        ".js" => "application/javascript",
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".gif" => "image/gif",
        ".svg" => "image/svg+xml",
        ".json" => "application/json",
        ".ico" => "image/x-icon",
        ".txt" => "text/plain",
        _ => "application/octet-stream",
    }
}
