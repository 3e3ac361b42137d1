//! HTTP/1.1 wire layer for the hearth server.
//!
//! This crate turns bytes into [`hearth_core::Request`] values and
//! responses back into bytes, and owns everything that touches a
//! socket: the request parser, the response serializer, the blocking
//! socket wrappers, the per-connection framing state machine, and the
//! listener/accept loop that feeds the worker pool.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hearth_core::{FileCache, Method, Response, Router};
//! use hearth_http::{Server, ServerConfig};
//!
//! let mut router = Router::new(Arc::new(FileCache::new(100)));
//! router.add_route(Method::Get, "/", |_, _, _| Response::text("ok"));
//!
//! let server = Server::bind(ServerConfig::new("127.0.0.1", 8080), Arc::new(router))
//!     .expect("bind failed");
//! server.run();
//! ```

#![deny(unsafe_code)]

pub mod connection;
pub mod parser;
pub mod query;
pub mod response;
pub mod server;
pub mod socket;

pub use connection::{Connection, ConnectionConfig};
pub use parser::{parse_request, ParseError};
pub use query::{parse_params, url_decode};
pub use response::{serialize, serialize_headers_only, POWERED_BY_TEXT, SERVER_NAME_VERSION};
pub use server::{
    default_worker_count, Server, ServerConfig, ServerError, DEFAULT_POLL_INTERVAL,
};
pub use socket::{is_timeout, Listener, Socket};
