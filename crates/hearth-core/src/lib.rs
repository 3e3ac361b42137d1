//! Core types and infrastructure for the hearth HTTP server.
//!
//! This crate holds everything that is independent of the wire
//! protocol: the request/response model with its case-insensitive
//! header map, byte ranges, the route registry and middleware
//! pipeline, the static file handler with its LRU content cache, the
//! worker pool, the shutdown flag, and structured logging.
//!
//! The HTTP/1.1 parsing, framing and socket handling live in
//! `hearth-http`, which builds on these types.

#![deny(unsafe_code)]

pub mod cache;
pub mod headers;
pub mod logging;
pub mod middleware;
pub mod pool;
pub mod range;
pub mod request;
pub mod response;
pub mod routing;
pub mod shutdown;
pub mod static_files;

pub use cache::{CacheEntry, FileCache, DEFAULT_CACHE_CAPACITY};
pub use headers::HeaderMap;
pub use logging::{set_global_log_level, set_json_output, LogContext, LogEntry, LogLevel};
pub use pool::WorkerPool;
pub use range::{content_range_unsatisfiable, RangeSpec, RangeUnsatisfiable, ResolvedRange};
pub use request::{HostAddress, HttpVersion, Method, ParamMap, Request};
pub use response::{
    mime_type_for_extension, Response, ResponseBody, StatusCode, StreamDescriptor,
};
pub use routing::{error_response, Middleware, Next, PathParams, RouteHandler, RoutePattern, Router};
pub use shutdown::ShutdownFlag;
pub use static_files::{format_http_date, StaticFiles, DEFAULT_STREAM_THRESHOLD};
