//! Built-in middlewares.
//!
//! A middleware receives the request, the optional pre-parsed JSON
//! body, and a `next` continuation for the rest of the pipeline. It
//! may short-circuit by returning a response without calling `next`.
//! See [`crate::routing::Router::add_middleware`].

use serde_json::Value;

use crate::log_info;
use crate::logging::LogContext;
use crate::request::Request;
use crate::response::{Response, ResponseBody, StatusCode};
use crate::routing::Next;

/// Middleware that logs the request line and the response status with
/// the body size (streamed bodies report their advertised length).
#[must_use]
pub fn request_logging() -> impl Fn(&Request, Option<&Value>, &Next<'_>) -> Response {
    move |request, _json_body, next| {
        log_info!(
            LogContext::server(),
            "request",
            method => request.method,
            path => &request.path
        );
        let response = next();
        match &response.body {
            ResponseBody::Bytes(bytes) => {
                log_info!(
                    LogContext::server(),
                    "response",
                    status => response.status.as_u16(),
                    bytes => bytes.len()
                );
            }
            ResponseBody::Stream(descriptor) => {
                log_info!(
                    LogContext::server(),
                    "response (streamed)",
                    status => response.status.as_u16(),
                    bytes => descriptor.total_bytes
                );
            }
        }
        response
    }
}

/// Middleware that requires `Authorization: Bearer <token>` for every
/// path under `path_prefix`; other paths pass through untouched.
#[must_use]
pub fn bearer_auth(
    path_prefix: &str,
    token: &str,
) -> impl Fn(&Request, Option<&Value>, &Next<'_>) -> Response {
    let path_prefix = path_prefix.to_string();
    let expected = format!("Bearer {token}");
    move |request, _json_body, next| {
        if request.path.starts_with(&path_prefix) {
            let authorized = request
                .header("authorization")
                .is_some_and(|value| value == expected);
            if !authorized {
                return Response::json_error(StatusCode::UNAUTHORIZED, "Unauthorized");
            }
        }
        next()
    }
}
