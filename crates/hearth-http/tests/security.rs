//! Security-focused tests: framing limits, Content-Length attacks,
//! and static-root containment, driven over real sockets.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use hearth_core::cache::FileCache;
use hearth_core::request::Method;
use hearth_core::response::Response;
use hearth_core::routing::Router;
use hearth_core::shutdown::ShutdownFlag;
use hearth_core::static_files::StaticFiles;
use hearth_http::{Server, ServerConfig};

struct Harness {
    addr: std::net::SocketAddr,
    shutdown: ShutdownFlag,
    handle: Option<std::thread::JoinHandle<()>>,
    _static_dir: tempfile::TempDir,
}

impl Harness {
    fn start(config: ServerConfig) -> Self {
        let static_dir = tempfile::tempdir().unwrap();
        std::fs::write(static_dir.path().join("public.txt"), b"public").unwrap();

        let cache = Arc::new(FileCache::new(8));
        let mut router = Router::new(Arc::clone(&cache));
        router.add_route(Method::Get, "/", |_, _, _| Response::text("ok"));
        router.add_route(Method::Post, "/echo", |request, _, _| {
            Response::text(request.body.clone())
        });
        router.set_static_files(StaticFiles::new(static_dir.path(), "/assets/"));

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

    fn default() -> Self {
        Self::start(
            ServerConfig::new("127.0.0.1", 0)
                .with_workers(1)
                .with_poll_interval(Duration::from_millis(10))
                .with_recv_timeout(Duration::from_millis(400))
                .with_max_header_size(1024)
                .with_max_content_length(256),
        )
    }

    fn request(&self, raw: &[u8]) -> (u16, Vec<u8>) {
        let mut stream = TcpStream::connect(self.addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream.write_all(raw).unwrap();
        read_one_response(&mut stream)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.trigger();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn read_one_response(stream: &mut TcpStream) -> (u16, Vec<u8>) {
    let mut raw = Vec::new();
    let mut byte = [0u8; 1];
    while !raw.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).expect("read failed");
        assert_ne!(n, 0, "connection closed before headers completed");
        raw.push(byte[0]);
    }
    let head = String::from_utf8_lossy(&raw).into_owned();
    let status: u16 = head
        .split("\r\n")
        .next()
        .unwrap()
        .split(' ')
        .nth(1)
        .unwrap()
        .parse()
        .unwrap();
    let content_length: usize = head
        .split("\r\n")
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())?
        })
        .unwrap_or(0);
    let mut body = vec![0u8; content_length];
    stream.read_exact(&mut body).expect("body read failed");
    (status, body)
}

fn expect_closed(stream: &mut TcpStream) {
    let mut buffer = [0u8; 32];
    loop {
        match stream.read(&mut buffer) {
            Ok(0) => return,
            Ok(_) => {}
            Err(error) => panic!("expected clean close, got {error}"),
        }
    }
}

// ============================================================================
// Framing limits
// ============================================================================

#[test]
fn oversized_header_block_is_400() {
    let harness = Harness::default();
    let mut raw = b"GET / HTTP/1.1\r\nHost: x\r\n".to_vec();
    raw.extend_from_slice(format!("X-Filler: {}\r\n\r\n", "a".repeat(2048)).as_bytes());

    let (status, _) = harness.request(&raw);
    assert_eq!(status, 400);
}

#[test]
fn duplicate_content_length_is_400() {
    let harness = Harness::default();
    let (status, _) = harness.request(
        b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 2\r\nContent-Length: 2\r\n\r\nhi",
    );
    assert_eq!(status, 400);
}

#[test]
fn conflicting_content_lengths_are_400() {
    let harness = Harness::default();
    let (status, _) = harness.request(
        b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 2\r\nContent-Length: 20\r\n\r\nhi",
    );
    assert_eq!(status, 400);
}

#[test]
fn oversized_content_length_is_400_and_closes() {
    let harness = Harness::default();
    let mut stream = TcpStream::connect(harness.addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
        .write_all(b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 10000\r\n\r\n")
        .unwrap();

    let (status, _) = read_one_response(&mut stream);
    assert_eq!(status, 400);
    expect_closed(&mut stream);
}

#[test]
fn non_numeric_content_length_is_400() {
    let harness = Harness::default();
    let (status, _) = harness.request(
        b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: banana\r\n\r\n",
    );
    assert_eq!(status, 400);
}

#[test]
fn body_at_limit_is_accepted() {
    let harness = Harness::default();
    let body = vec![b'z'; 256];
    let mut raw =
        format!("POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n", body.len())
            .into_bytes();
    raw.extend_from_slice(&body);

    let (status, reply) = harness.request(&raw);
    assert_eq!(status, 200);
    assert_eq!(reply, body);
}

// ============================================================================
// Malformed requests
// ============================================================================

#[test]
fn garbage_request_line_is_400() {
    let harness = Harness::default();
    let (status, _) = harness.request(b"NONSENSE\r\n\r\n");
    assert_eq!(status, 400);
}

#[test]
fn malformed_range_is_400() {
    let harness = Harness::default();
    let (status, _) = harness.request(
        b"GET /assets/public.txt HTTP/1.1\r\nHost: x\r\nRange: bytes=tail\r\n\r\n",
    );
    assert_eq!(status, 400);
}

// ============================================================================
// Static root containment
// ============================================================================

#[test]
fn dotdot_traversal_is_403_even_for_missing_targets() {
    let harness = Harness::default();
    let (status, _) = harness.request(
        b"GET /assets/../secret/nonexistent HTTP/1.1\r\nHost: x\r\n\r\n",
    );
    assert_eq!(status, 403);
}

#[test]
fn nested_dotdot_is_403() {
    let harness = Harness::default();
    let (status, _) = harness.request(
        b"GET /assets/a/../../public.txt HTTP/1.1\r\nHost: x\r\n\r\n",
    );
    assert_eq!(status, 403);
}

#[test]
fn percent_encoded_dotdot_misses_instead_of_escaping() {
    let harness = Harness::default();
    // The path is not percent-decoded for filesystem lookup, so this
    // names a literal "%2e%2e" directory, which does not exist.
    let (status, _) = harness.request(
        b"GET /assets/%2e%2e/secret HTTP/1.1\r\nHost: x\r\n\r\n",
    );
    assert_eq!(status, 404);
}

#[test]
fn legitimate_static_file_still_served() {
    let harness = Harness::default();
    let (status, body) = harness.request(
        b"GET /assets/public.txt HTTP/1.1\r\nHost: x\r\n\r\n",
    );
    assert_eq!(status, 200);
    assert_eq!(body, b"public");
}
