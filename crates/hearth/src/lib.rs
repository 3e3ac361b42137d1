//! hearth: a multi-threaded HTTP/1.1 origin server.
//!
//! This facade crate re-exports the public API of `hearth-core`
//! (types, routing, static files, cache, pool, logging) and
//! `hearth-http` (parser, connection handling, server loop).
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use hearth::{FileCache, Method, Response, Router, Server, ServerConfig, StaticFiles};
//!
//! let cache = Arc::new(FileCache::new(100));
//! let mut router = Router::new(Arc::clone(&cache));
//! router.add_route(Method::Get, "/", |_, _, _| Response::text("Welcome!"));
//! router.set_static_files(StaticFiles::new("static", "/assets/"));
//!
//! let server = Server::bind(ServerConfig::new("0.0.0.0", 8080), Arc::new(router))
//!     .expect("bind failed");
//! server.run();
//! ```

pub use hearth_core::{
    error_response, format_http_date, mime_type_for_extension, set_global_log_level,
    set_json_output, CacheEntry, FileCache, HeaderMap, HostAddress, HttpVersion, LogContext,
    LogEntry, LogLevel, Method, Middleware, ParamMap, PathParams, RangeSpec, RangeUnsatisfiable,
    Request, ResolvedRange, Response, ResponseBody, Router, ShutdownFlag, StaticFiles, StatusCode,
    StreamDescriptor, WorkerPool, DEFAULT_CACHE_CAPACITY, DEFAULT_STREAM_THRESHOLD,
};
pub use hearth_core::middleware::{bearer_auth, request_logging};
pub use hearth_http::{
    default_worker_count, is_timeout, parse_request, serialize, serialize_headers_only,
    Connection, ConnectionConfig, Listener, ParseError, Server, ServerConfig, ServerError, Socket,
    DEFAULT_POLL_INTERVAL,
};
