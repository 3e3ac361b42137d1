//! Demo application: a handful of routes, two middlewares, and a
//! static directory mounted at `/assets/`.
//!
//! Run with `cargo run --example demo`, then try:
//!
//! ```text
//! curl http://127.0.0.1:8080/
//! curl http://127.0.0.1:8080/user/42 -H 'Authorization: Bearer dummy_token'
//! curl http://127.0.0.1:8080/query?a=1&a=2
//! curl -d 'a=1&b=hi' http://127.0.0.1:8080/form
//! ```

use std::sync::Arc;

use hearth::{
    bearer_auth, request_logging, FileCache, LogLevel, Method, Response, Router, Server,
    ServerConfig, StaticFiles, StatusCode,
};
use serde_json::json;

fn main() {
    hearth::set_global_log_level(LogLevel::Debug);

    let cache = Arc::new(FileCache::new(100));
    let mut router = Router::new(Arc::clone(&cache));

    router.add_middleware(request_logging());
    router.add_middleware(bearer_auth("/user/", "dummy_token"));

    router.add_route(Method::Get, "/", |_, _, _| {
        Response::text("Welcome to the home page!")
    });
    router.add_route(Method::Get, "/about", |_, _, _| {
        Response::text("About page: This is a simple server.")
    });
    router.add_route(Method::Post, "/echo", |request, _, _| {
        Response::text(request.body.clone())
    });

    router.add_route(Method::Post, "/json", |request, _, json_body| {
        let Some(body) = json_body else {
            return Response::json_error(StatusCode::BAD_REQUEST, "Missing or invalid JSON body");
        };
        let name = body["name"].as_str().unwrap_or("Unknown");
        Response::json(&json!({
            "status": "received",
            "name": name,
            "size": request.body.len(),
        }))
    });

    router.add_route(Method::Get, "/query", |request, _, _| {
        let mut reply = serde_json::Map::new();
        for (key, values) in &request.query_params {
            let value = if values.len() == 1 {
                json!(values[0])
            } else {
                json!(values)
            };
            reply.insert(key.clone(), value);
        }
        Response::json(&reply)
    });

    router.add_route(Method::Post, "/form", |request, _, _| {
        if request.form_params.is_empty() {
            return Response::json_error(
                StatusCode::BAD_REQUEST,
                "No form data or invalid Content-Type",
            );
        }
        let mut reply = serde_json::Map::new();
        for (key, values) in &request.form_params {
            let value = if values.len() == 1 {
                json!(values[0])
            } else {
                json!(values)
            };
            reply.insert(key.clone(), value);
        }
        Response::json(&reply)
    });

    router.add_route(Method::Get, "/user/:id", |_, params, _| {
        Response::json(&json!({ "id": params["id"], "message": "User found" }))
    });
    router.add_route(Method::Put, "/user/:id", |_, params, json_body| {
        let Some(body) = json_body else {
            return Response::json_error(StatusCode::BAD_REQUEST, "Missing JSON body");
        };
        Response::json(&json!({ "id": params["id"], "message": "User updated", "data": body }))
    });
    router.add_route(Method::Delete, "/user/:id", |_, params, _| {
        Response::json(&json!({ "id": params["id"], "message": "User deleted" }))
    });
    router.add_route(Method::Patch, "/user/:id", |_, params, json_body| {
        let Some(body) = json_body else {
            return Response::json_error(StatusCode::BAD_REQUEST, "Missing JSON body");
        };
        Response::json(&json!({ "id": params["id"], "message": "User patched", "data": body }))
    });

    router.set_static_files(StaticFiles::new("static", "/assets/"));

    let server = match Server::bind(ServerConfig::new("0.0.0.0", 8080), Arc::new(router)) {
        Ok(server) => server,
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(1);
        }
    };
    server.run();
}
