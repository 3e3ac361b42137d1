//! End-to-end tests over real TCP connections.
//!
//! Each test starts a server on an ephemeral port with the demo-style
//! route set, speaks raw HTTP/1.1 over a `TcpStream`, and asserts on
//! the bytes that come back.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use hearth::{
    bearer_auth, FileCache, Method, Response, Router, Server, ServerConfig, ShutdownFlag,
    StaticFiles, StatusCode,
};
use serde_json::json;

struct TestServer {
    addr: std::net::SocketAddr,
    shutdown: ShutdownFlag,
    handle: Option<std::thread::JoinHandle<()>>,
    // Kept alive for the static files tests.
    _static_dir: tempfile::TempDir,
}

impl TestServer {
    fn start() -> Self {
        let static_dir = tempfile::tempdir().unwrap();
        std::fs::write(static_dir.path().join("doc.txt"), b"0123456789abcdefghij").unwrap();
        std::fs::write(static_dir.path().join("page.html"), b"<html>hi</html>").unwrap();

        let cache = Arc::new(FileCache::new(16));
        let mut router = Router::new(Arc::clone(&cache));
        router.add_middleware(bearer_auth("/user/", "dummy_token"));

        router.add_route(Method::Get, "/", |_, _, _| Response::text("ok"));
        router.add_route(Method::Post, "/echo", |request, _, _| {
            Response::text(request.body.clone())
        });
        router.add_route(Method::Get, "/user/:id", |_, params, _| {
            Response::json(&json!({ "id": params["id"] }))
        });
        router.add_route(Method::Post, "/form", |request, _, _| {
            let mut reply = serde_json::Map::new();
            for (key, values) in &request.form_params {
                reply.insert(key.clone(), json!(values));
            }
            Response::json(&reply)
        });
        router.add_route(Method::Post, "/json", |_, _, json_body| match json_body {
            Some(body) => Response::json(&json!({ "name": body["name"] })),
            None => Response::json_error(StatusCode::BAD_REQUEST, "Missing JSON body"),
        });
        router.set_static_files(StaticFiles::new(static_dir.path(), "/assets/"));

        let config = ServerConfig::new("127.0.0.1", 0)
            .with_workers(2)
            .with_poll_interval(Duration::from_millis(10))
            .with_recv_timeout(Duration::from_millis(500));
        let server = Server::bind(config, Arc::new(router)).unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_flag();
        let handle = std::thread::spawn(move || server.run());

        Self {
            addr,
            shutdown,
            handle: Some(handle),
            _static_dir: static_dir,
        }
    }

    fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct RawResponse {
    status: u16,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

/// Read exactly one response: status line, headers, then
/// Content-Length body bytes.
fn read_response(stream: &mut TcpStream) -> RawResponse {
    let mut raw = Vec::new();
    let mut byte = [0u8; 1];
    while !raw.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).expect("read failed");
        assert_ne!(n, 0, "connection closed before header terminator");
        raw.push(byte[0]);
    }

    let text = String::from_utf8(raw).unwrap();
    let mut lines = text.split("\r\n");
    let status_line = lines.next().unwrap();
    let status: u16 = status_line.split(' ').nth(1).unwrap().parse().unwrap();

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .map(|v| v.parse().unwrap())
        .unwrap_or(0);
    let mut body = vec![0u8; content_length];
    stream.read_exact(&mut body).expect("body read failed");

    RawResponse {
        status,
        headers,
        body,
    }
}

fn read_to_close(stream: &mut TcpStream) -> bool {
    let mut buffer = [0u8; 64];
    loop {
        match stream.read(&mut buffer) {
            Ok(0) => return true,
            Ok(_) => {}
            Err(_) => return false,
        }
    }
}

#[test]
fn simple_route_round_trip() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);

    assert_eq!(response.status, 200);
    assert_eq!(response.headers["content-length"], "2");
    assert_eq!(response.headers["content-type"], "text/plain");
    assert_eq!(response.body, b"ok");
    assert!(response.headers.contains_key("server"));
    assert!(response.headers.contains_key("x-powered-by"));
}

#[test]
fn path_params_reach_the_handler() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream
        .write_all(b"GET /user/42 HTTP/1.1\r\nHost: x\r\nAuthorization: Bearer dummy_token\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);

    assert_eq!(response.status, 200);
    let value: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(value["id"], "42");
}

#[test]
fn auth_middleware_rejects_missing_token() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream
        .write_all(b"GET /user/42 HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);
    assert_eq!(response.status, 401);
}

#[test]
fn form_body_is_parsed_multivalued() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream
        .write_all(
            b"POST /form HTTP/1.1\r\nHost: x\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 13\r\n\r\na=1&a=2&b=hi",
        )
        .unwrap();
    let response = read_response(&mut stream);

    assert_eq!(response.status, 200);
    let value: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(value["a"], json!(["1", "2"]));
    assert_eq!(value["b"], json!(["hi"]));
}

#[test]
fn range_request_on_static_file() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream
        .write_all(b"GET /assets/doc.txt HTTP/1.1\r\nHost: x\r\nRange: bytes=0-4\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);

    assert_eq!(response.status, 206);
    assert_eq!(response.headers["content-range"], "bytes 0-4/20");
    assert_eq!(response.headers["content-length"], "5");
    assert_eq!(response.headers["accept-ranges"], "bytes");
    assert_eq!(response.body, b"01234");
}

#[test]
fn open_ended_range_returns_whole_tail() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream
        .write_all(b"GET /assets/doc.txt HTTP/1.1\r\nHost: x\r\nRange: bytes=0-\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);

    assert_eq!(response.status, 206);
    assert_eq!(response.headers["content-range"], "bytes 0-19/20");
    assert_eq!(response.headers["content-length"], "20");
}

#[test]
fn range_at_file_size_is_416() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream
        .write_all(b"GET /assets/doc.txt HTTP/1.1\r\nHost: x\r\nRange: bytes=20-\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);

    assert_eq!(response.status, 416);
    assert_eq!(response.headers["content-range"], "bytes */20");
}

#[test]
fn pipelined_requests_answered_in_order() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\nGET /assets/doc.txt HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();

    let first = read_response(&mut stream);
    assert_eq!(first.status, 200);
    assert_eq!(first.body, b"ok");

    let second = read_response(&mut stream);
    assert_eq!(second.status, 200);
    assert_eq!(second.body, b"0123456789abcdefghij");

    // The connection is still usable afterwards.
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let third = read_response(&mut stream);
    assert_eq!(third.status, 200);
}

#[test]
fn path_traversal_is_forbidden() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream
        .write_all(b"GET /assets/../etc/passwd HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);
    assert_eq!(response.status, 403);
}

#[test]
fn connection_close_is_honored() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);
    assert_eq!(response.status, 200);
    assert_eq!(response.headers["connection"], "close");
    assert!(read_to_close(&mut stream));
}

#[test]
fn http10_without_keep_alive_closes() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream.write_all(b"GET / HTTP/1.0\r\n\r\n").unwrap();
    let response = read_response(&mut stream);
    assert_eq!(response.status, 200);
    assert_eq!(response.headers["connection"], "close");
    assert!(read_to_close(&mut stream));
}

#[test]
fn http11_missing_host_is_400() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
    let response = read_response(&mut stream);
    assert_eq!(response.status, 400);
    assert_eq!(response.headers["connection"], "close");
}

#[test]
fn lf_only_terminator_is_accepted() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream.write_all(b"GET / HTTP/1.1\nHost: x\n\n").unwrap();
    let response = read_response(&mut stream);
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"ok");
}

#[test]
fn json_body_is_preparsed_for_handlers() {
    let server = TestServer::start();
    let mut stream = server.connect();

    let body = br#"{"name": "hearth"}"#;
    let request = format!(
        "POST /json HTTP/1.1\r\nHost: x\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    stream.write_all(request.as_bytes()).unwrap();
    stream.write_all(body).unwrap();

    let response = read_response(&mut stream);
    assert_eq!(response.status, 200);
    let value: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(value["name"], "hearth");
}

#[test]
fn invalid_json_body_is_400_and_closes() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream
        .write_all(b"POST /json HTTP/1.1\r\nHost: x\r\nContent-Type: application/json\r\nContent-Length: 5\r\n\r\n{oops")
        .unwrap();
    let response = read_response(&mut stream);
    assert_eq!(response.status, 400);
    assert!(read_to_close(&mut stream));
}

#[test]
fn unknown_path_is_404_json_by_default() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream
        .write_all(b"GET /missing HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);
    assert_eq!(response.status, 404);
    assert_eq!(response.headers["content-type"], "application/json");
}

#[test]
fn html_accept_gets_html_error_page() {
    let server = TestServer::start();
    let mut stream = server.connect();

    stream
        .write_all(b"GET /missing HTTP/1.1\r\nHost: x\r\nAccept: text/html\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);
    assert_eq!(response.status, 404);
    assert_eq!(response.headers["content-type"], "text/html; charset=utf-8");
    assert!(String::from_utf8_lossy(&response.body).contains("404"));
}

#[test]
fn request_limit_closes_the_connection() {
    let cache = Arc::new(FileCache::new(4));
    let mut router = Router::new(cache);
    router.add_route(Method::Get, "/", |_, _, _| Response::text("ok"));
    let config = ServerConfig::new("127.0.0.1", 0)
        .with_workers(1)
        .with_poll_interval(Duration::from_millis(10))
        .with_max_requests(2)
        .with_recv_timeout(Duration::from_millis(500));
    let limited = Server::bind(config, Arc::new(router)).unwrap();
    let addr = limited.local_addr().unwrap();
    let shutdown = limited.shutdown_flag();
    let handle = std::thread::spawn(move || limited.run());

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    for _ in 0..2 {
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap();
        let response = read_response(&mut stream);
        assert_eq!(response.status, 200);
    }
    assert!(read_to_close(&mut stream));

    shutdown.trigger();
    let _ = handle.join();
}
