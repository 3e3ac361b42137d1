//! Route registry, pattern matching and the middleware pipeline.
//!
//! Path templates use `:name` parameters (`/user/:id`). A template is
//! compiled once at registration into a segment matcher; parameters
//! match any single non-slash segment and are bound by position.
//! Matching tries routes for the request's method in insertion order;
//! the first template that matches wins.
//!
//! Dispatch builds a terminal handler (static files first, then the
//! matched route, then 404/405) and wraps it with the registered
//! middlewares in reverse order, so the first middleware added is the
//! outermost.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::cache::FileCache;
use crate::log_debug;
use crate::logging::LogContext;
use crate::request::{Method, Request};
use crate::response::{Response, ResponseBody, StatusCode};
use crate::static_files::StaticFiles;

/// Path parameters bound from `:name` captures.
pub type PathParams = HashMap<String, String>;

/// A route handler: request, bound path parameters, and the pre-parsed
/// JSON body when the request carried one.
pub type RouteHandler =
    Arc<dyn Fn(&Request, &PathParams, Option<&Value>) -> Response + Send + Sync>;

/// Continuation passed to middleware; invokes the rest of the chain.
pub type Next<'a> = dyn Fn() -> Response + 'a;

/// A middleware wraps the rest of the pipeline. It may short-circuit
/// by returning without calling `next`.
pub type Middleware = Arc<dyn Fn(&Request, Option<&Value>, &Next<'_>) -> Response + Send + Sync>;

/// One segment of a compiled route template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Literal path segment.
    Literal(String),
    /// `:name` parameter capturing one non-slash segment.
    Param(String),
}

/// A route template compiled at registration time.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    template: String,
    segments: Vec<Segment>,
    param_names: Vec<String>,
}

impl RoutePattern {
    /// Compile a template such as `/user/:id`.
    #[must_use]
    pub fn compile(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut param_names = Vec::new();
        for part in template.split('/').filter(|s| !s.is_empty()) {
            if let Some(name) = part.strip_prefix(':') {
                param_names.push(name.to_string());
                segments.push(Segment::Param(name.to_string()));
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }
        Self {
            template: template.to_string(),
            segments,
            param_names,
        }
    }

    /// The original template string.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Names of the `:name` parameters, in template order.
    #[must_use]
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Match a request path, binding parameters by position.
    ///
    /// The match is anchored: every path segment must be consumed.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<PathParams> {
        let mut params = PathParams::new();
        let mut path_segments = path.split('/').filter(|s| !s.is_empty());

        for segment in &self.segments {
            let actual = path_segments.next()?;
            match segment {
                Segment::Literal(expected) => {
                    if actual != expected {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), actual.to_string());
                }
            }
        }

        if path_segments.next().is_some() {
            return None;
        }
        Some(params)
    }
}

struct Route {
    pattern: RoutePattern,
    handler: RouteHandler,
}

/// Route registry plus ordered middleware list and static-file
/// fallback.
///
/// Built once at startup (`add_route`/`add_middleware`), then shared
/// immutably with every connection handler.
pub struct Router {
    routes_by_method: HashMap<Method, Vec<Route>>,
    middlewares: Vec<Middleware>,
    static_files: Option<StaticFiles>,
    cache: Arc<FileCache>,
}

impl Router {
    /// Create an empty router backed by the given file cache.
    #[must_use]
    pub fn new(cache: Arc<FileCache>) -> Self {
        Self {
            routes_by_method: HashMap::new(),
            middlewares: Vec::new(),
            static_files: None,
            cache,
        }
    }

    /// Register a route. Templates are compiled here, never per
    /// request.
    pub fn add_route<H>(&mut self, method: Method, template: &str, handler: H)
    where
        H: Fn(&Request, &PathParams, Option<&Value>) -> Response + Send + Sync + 'static,
    {
        let route = Route {
            pattern: RoutePattern::compile(template),
            handler: Arc::new(handler),
        };
        self.routes_by_method.entry(method).or_default().push(route);
    }

    /// Append a middleware. The first one added runs outermost.
    pub fn add_middleware<M>(&mut self, middleware: M)
    where
        M: Fn(&Request, Option<&Value>, &Next<'_>) -> Response + Send + Sync + 'static,
    {
        self.middlewares.push(Arc::new(middleware));
    }

    /// Mount a static file handler.
    pub fn set_static_files(&mut self, static_files: StaticFiles) {
        self.static_files = Some(static_files);
    }

    /// The file cache consulted by the static handler.
    #[must_use]
    pub fn cache(&self) -> &Arc<FileCache> {
        &self.cache
    }

    /// Dispatch a request through the middleware pipeline to the
    /// terminal handler.
    #[must_use]
    pub fn dispatch(&self, request: &Request, json_body: Option<&Value>, ctx: LogContext) -> Response {
        let terminal = || self.terminal(request, json_body, ctx);
        self.run_middleware(0, request, json_body, &terminal)
    }

    fn run_middleware(
        &self,
        index: usize,
        request: &Request,
        json_body: Option<&Value>,
        terminal: &Next<'_>,
    ) -> Response {
        match self.middlewares.get(index) {
            None => terminal(),
            Some(middleware) => {
                let next = || self.run_middleware(index + 1, request, json_body, terminal);
                middleware(request, json_body, &next)
            }
        }
    }

    /// The terminal handler: static files, then the first matching
    /// route, then 404 (or 405 when the method has no routes at all).
    fn terminal(&self, request: &Request, json_body: Option<&Value>, ctx: LogContext) -> Response {
        if let Some(static_files) = &self.static_files {
            if let Some(response) = static_files.serve(request, &self.cache, ctx) {
                return response;
            }
        }

        if let Some((route, params)) = self.match_route(request) {
            log_debug!(
                ctx,
                "route matched",
                template => route.pattern.template(),
                path => &request.path
            );
            return (route.handler)(request, &params, json_body);
        }

        let prefers_html = request.prefers_html();
        if !self.routes_by_method.contains_key(&request.method) {
            return error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed", prefers_html);
        }
        error_response(StatusCode::NOT_FOUND, "Page not found", prefers_html)
    }

    fn match_route(&self, request: &Request) -> Option<(&Route, PathParams)> {
        let routes = self.routes_by_method.get(&request.method)?;
        for route in routes {
            if let Some(params) = route.pattern.match_path(&request.path) {
                return Some((route, params));
            }
        }
        None
    }
}

// ============================================================================
// Negotiated error responses
// ============================================================================

const ERROR_403_HTML: &str = "<!DOCTYPE html>\n<html><head><title>403 Forbidden</title></head>\n<body><h1>403 Forbidden</h1><p>Access denied.</p></body></html>\n";
const ERROR_404_HTML: &str = "<!DOCTYPE html>\n<html><head><title>404 Not Found</title></head>\n<body><h1>404 Not Found</h1><p>The requested resource was not found.</p></body></html>\n";
const ERROR_405_HTML: &str = "<!DOCTYPE html>\n<html><head><title>405 Method Not Allowed</title></head>\n<body><h1>405 Method Not Allowed</h1></body></html>\n";
const ERROR_416_HTML: &str = "<!DOCTYPE html>\n<html><head><title>416 Range Not Satisfiable</title></head>\n<body><h1>416 Range Not Satisfiable</h1></body></html>\n";
const ERROR_500_HTML: &str = "<!DOCTYPE html>\n<html><head><title>500 Internal Server Error</title></head>\n<body><h1>500 Internal Server Error</h1></body></html>\n";

fn canned_page(status: StatusCode) -> &'static str {
    match status.as_u16() {
        403 => ERROR_403_HTML,
        404 => ERROR_404_HTML,
        405 => ERROR_405_HTML,
        416 => ERROR_416_HTML,
        _ => ERROR_500_HTML,
    }
}

/// Build an error response body per the client's `Accept` header:
/// a canned HTML page when it mentions `text/html`, otherwise a JSON
/// `{"error": message}` object.
#[must_use]
pub fn error_response(status: StatusCode, message: &str, prefers_html: bool) -> Response {
    if prefers_html {
        Response::new(status, canned_page(status), "text/html; charset=utf-8")
    } else {
        Response::json_error(status, message)
    }
}
