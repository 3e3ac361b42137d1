//! HTTP request types.

use std::collections::BTreeMap;
use std::fmt;

use crate::headers::HeaderMap;
use crate::range::RangeSpec;

/// A host and port pair, displayed as `host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddress {
    /// Host name or address literal.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl HostAddress {
    /// Create a new host address.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Placeholder used when the peer address cannot be determined.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new("unknown", 0)
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// HTTP method.
///
/// Tokens outside the known set parse as [`Method::Unknown`]; routing
/// then produces a 405 since no routes can be registered for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET method.
    Get,
    /// POST method.
    Post,
    /// PUT method.
    Put,
    /// DELETE method.
    Delete,
    /// HEAD method.
    Head,
    /// OPTIONS method.
    Options,
    /// PATCH method.
    Patch,
    /// TRACE method.
    Trace,
    /// CONNECT method.
    Connect,
    /// Unrecognized method token.
    Unknown,
}

impl Method {
    /// Parse a method token. The comparison is exact-case.
    #[must_use]
    pub fn parse(token: &str) -> Self {
        match token {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "PATCH" => Self::Patch,
            "TRACE" => Self::Trace,
            "CONNECT" => Self::Connect,
            _ => Self::Unknown,
        }
    }

    /// Return the canonical uppercase method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl Default for Method {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpVersion {
    /// HTTP/0.9
    Http09,
    /// HTTP/1.0
    Http10,
    /// HTTP/1.1 (default)
    #[default]
    Http11,
    /// HTTP/2
    Http2,
    /// HTTP/3
    Http3,
}

impl HttpVersion {
    /// Parse a version string. Unknown strings default to HTTP/1.1.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "HTTP/0.9" => Self::Http09,
            "HTTP/1.0" => Self::Http10,
            "HTTP/2" => Self::Http2,
            "HTTP/3" => Self::Http3,
            _ => Self::Http11,
        }
    }

    /// Returns the version string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http09 => "HTTP/0.9",
            Self::Http10 => "HTTP/1.0",
            Self::Http11 => "HTTP/1.1",
            Self::Http2 => "HTTP/2",
            Self::Http3 => "HTTP/3",
        }
    }

    /// Returns true if this is HTTP/1.1.
    #[must_use]
    pub fn is_http11(self) -> bool {
        matches!(self, Self::Http11)
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multi-valued parameter map for query strings and form bodies.
///
/// Values accumulate per key in insertion order.
pub type ParamMap = BTreeMap<String, Vec<String>>;

/// A fully parsed HTTP request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// HTTP version.
    pub version: HttpVersion,
    /// Request path, excluding the query string.
    pub path: String,
    /// Query parameters decoded from the request target.
    pub query_params: ParamMap,
    /// Headers, keyed case-insensitively.
    pub headers: HeaderMap,
    /// Raw body bytes.
    pub body: Vec<u8>,
    /// Form parameters, populated for urlencoded POST bodies.
    pub form_params: ParamMap,
    /// Byte range requested via the `Range` header, if any.
    pub range: Option<RangeSpec>,
}

impl Request {
    /// Create a request with the given method and path.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Default::default()
        }
    }

    /// Get a header value (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Decide keep-alive for this request.
    ///
    /// An explicit `Connection: keep-alive` (value compared
    /// case-insensitively) keeps the connection open and any other
    /// explicit value closes it; with no `Connection` header the
    /// HTTP/1.1 default applies.
    #[must_use]
    pub fn keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(value) => value.trim().eq_ignore_ascii_case("keep-alive"),
            None => self.version.is_http11(),
        }
    }

    /// Returns true if the client's `Accept` header mentions
    /// `text/html` (case-insensitive substring match).
    #[must_use]
    pub fn prefers_html(&self) -> bool {
        self.headers
            .get("accept")
            .is_some_and(|accept| accept.to_ascii_lowercase().contains("text/html"))
    }
}
