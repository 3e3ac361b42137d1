//! Connection handling.
//!
//! One [`Connection`] owns one accepted socket and a configuration
//! snapshot, and drives the request/response cycle until the peer
//! closes, an error occurs, keep-alive ends, or the per-connection
//! request limit is reached.
//!
//! The framing state machine reads the header block (accepting a bare
//! `\n\n` terminator by normalizing it to `\r\n\r\n`), scans
//! Content-Length (two or more occurrences are a framing error, even
//! with equal values), reads the body to completion, and then walks
//! the accumulated buffer, which may hold several pipelined requests.
//! Each request is parsed, dispatched through the router, and answered
//! in order on the same socket. A partial trailing fragment after the
//! last complete request is discarded with a warning; no second read
//! pass is attempted for it.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::time::Duration;

use hearth_core::logging::LogContext;
use hearth_core::response::{Response, ResponseBody, StatusCode};
use hearth_core::routing::Router;
use hearth_core::{log_debug, log_error, log_info, log_warn};
use serde_json::Value;

use crate::parser::parse_request;
use crate::response::{serialize, serialize_headers_only};
use crate::socket::{is_timeout, Socket};

const HEADER_SCRATCH_SIZE: usize = 512;
const BODY_SCRATCH_SIZE: usize = 512;
const REQUEST_BUFFER_RESERVE: usize = 1024;

/// Per-connection limits and timeouts, snapshotted from the server
/// configuration at accept time.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Receive timeout applied to the socket.
    pub recv_timeout: Duration,
    /// Send timeout applied to the socket.
    pub send_timeout: Duration,
    /// Maximum requests served on one connection.
    pub max_requests: usize,
    /// Maximum size of a request's header block.
    pub max_header_size: usize,
    /// Maximum Content-Length accepted.
    pub max_content_length: usize,
    /// Chunk size for streamed file bodies.
    pub stream_buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(5),
            max_requests: 100,
            max_header_size: 8 * 1024,
            max_content_length: 1024 * 1024,
            stream_buffer_size: 64 * 1024,
        }
    }
}

/// Framing violations that warrant a 400 before closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramingError {
    HeadersTooLarge,
    MultipleContentLength,
    InvalidContentLength,
    ContentLengthTooLarge,
    IncompleteBody,
}

impl FramingError {
    fn message(self) -> &'static str {
        match self {
            Self::HeadersTooLarge => "Headers too large",
            Self::MultipleContentLength => "Multiple Content-Length headers",
            Self::InvalidContentLength => "Invalid Content-Length value",
            Self::ContentLengthTooLarge => "Content-Length too large",
            Self::IncompleteBody => "Incomplete request body",
        }
    }
}

enum BatchOutcome {
    KeepAlive,
    Close,
}

/// Handler for a single accepted connection.
pub struct Connection {
    socket: Socket,
    config: ConnectionConfig,
    router: Arc<Router>,
    ctx: LogContext,
}

impl Connection {
    /// Take ownership of the socket and apply the configured timeouts.
    #[must_use]
    pub fn new(socket: Socket, config: ConnectionConfig, router: Arc<Router>) -> Self {
        let connection_id = rand::random::<u64>();
        let ctx = LogContext::new(connection_id, None);

        if let Err(error) = socket.set_recv_timeout(config.recv_timeout) {
            log_error!(ctx, "failed to set recv timeout", error => error);
        }
        if let Err(error) = socket.set_send_timeout(config.send_timeout) {
            log_error!(ctx, "failed to set send timeout", error => error);
        }
        log_info!(ctx, "connection opened", peer => socket.peer());

        Self {
            socket,
            config,
            router,
            ctx,
        }
    }

    /// Serve requests until close. Consumes the connection; the socket
    /// closes when it drops.
    pub fn run(mut self) {
        let mut handled = 0usize;
        while handled < self.config.max_requests {
            match self.process_batch(&mut handled) {
                BatchOutcome::KeepAlive => {}
                BatchOutcome::Close => break,
            }
        }
        log_info!(self.ctx, "connection closed", requests => handled);
    }

    /// Read one batch of bytes (one request plus any pipelined
    /// followers fully present) and answer every complete request in
    /// it.
    fn process_batch(&mut self, handled: &mut usize) -> BatchOutcome {
        let batch_ctx = self.ctx.with_request(rand::random::<u64>());

        let mut buffer = Vec::with_capacity(REQUEST_BUFFER_RESERVE);
        let header_end = match self.read_headers(&mut buffer, batch_ctx) {
            Ok(Some(header_end)) => header_end,
            Ok(None) => return BatchOutcome::Close,
            Err(violation) => {
                self.reject(violation, batch_ctx);
                return BatchOutcome::Close;
            }
        };

        let content_length =
            match scan_content_length(&buffer[..header_end], self.config.max_content_length) {
                Ok(length) => length,
                Err(violation) => {
                    self.reject(violation, batch_ctx);
                    return BatchOutcome::Close;
                }
            };
        if content_length > 0 && !self.read_until(&mut buffer, header_end + content_length, batch_ctx)
        {
            self.reject(FramingError::IncompleteBody, batch_ctx);
            return BatchOutcome::Close;
        }
        log_info!(batch_ctx, "request bytes received", bytes => buffer.len());

        let mut processed = 0usize;
        let mut keep_alive = false;

        while processed < buffer.len() {
            if *handled >= self.config.max_requests {
                log_info!(self.ctx, "request limit reached", limit => self.config.max_requests);
                return BatchOutcome::Close;
            }
            let ctx = self.ctx.with_request(rand::random::<u64>());

            let (header_block, consumed) = match split_header_block(&buffer[processed..]) {
                Some(parts) => parts,
                None => {
                    log_warn!(
                        ctx,
                        "partial pipeline data discarded",
                        bytes => buffer.len() - processed
                    );
                    break;
                }
            };

            let content_length =
                match scan_content_length(&header_block, self.config.max_content_length) {
                    Ok(length) => length,
                    Err(violation) => {
                        self.reject(violation, ctx);
                        return BatchOutcome::Close;
                    }
                };

            let body_start = processed + consumed;
            let body_end = body_start + content_length;
            if body_end > buffer.len() && !self.read_until(&mut buffer, body_end, ctx) {
                self.reject(FramingError::IncompleteBody, ctx);
                return BatchOutcome::Close;
            }

            let mut single_request = header_block;
            single_request.extend_from_slice(&buffer[body_start..body_end]);
            processed = body_end;

            let mut request = match parse_request(&single_request, ctx) {
                Ok(request) => request,
                Err(error) => {
                    log_error!(ctx, "request parse failed", error => error);
                    self.send_400("Malformed request", ctx);
                    return BatchOutcome::Close;
                }
            };

            let content_type = request.headers.get("content-type").unwrap_or("").to_string();
            if content_type.contains("application/json") || content_type.starts_with("text/plain") {
                trim_trailing_whitespace(&mut request.body);
            }

            if request.version.is_http11() && !request.headers.contains("host") {
                log_error!(ctx, "missing Host header");
                self.send_400("Missing Host header", ctx);
                return BatchOutcome::Close;
            }

            let json_body: Option<Value> = if content_type.contains("application/json") {
                match serde_json::from_slice(&request.body) {
                    Ok(value) => {
                        log_debug!(ctx, "parsed JSON body");
                        Some(value)
                    }
                    Err(error) => {
                        log_error!(ctx, "JSON parse failed", error => error);
                        self.send_400("Invalid JSON", ctx);
                        return BatchOutcome::Close;
                    }
                }
            } else {
                None
            };

            log_info!(ctx, "request", method => request.method, path => &request.path);
            keep_alive = request.keep_alive();

            let mut response = self.router.dispatch(&request, json_body.as_ref(), ctx);
            response.set_header(
                "Connection",
                if keep_alive { "keep-alive" } else { "close" },
            );

            if let Err(error) = self.write_response(&response, ctx) {
                log_error!(ctx, "failed to write response", error => error);
                return BatchOutcome::Close;
            }
            *handled += 1;

            if !keep_alive {
                if processed < buffer.len() {
                    log_warn!(
                        ctx,
                        "pipeline bytes dropped after close",
                        bytes => buffer.len() - processed
                    );
                }
                return BatchOutcome::Close;
            }
        }

        if keep_alive {
            BatchOutcome::KeepAlive
        } else {
            BatchOutcome::Close
        }
    }

    /// Read until a header terminator is buffered. The bare `\n\n`
    /// form is rewritten to `\r\n\r\n` in place.
    ///
    /// Returns `Ok(None)` on EOF, timeout or hard read error (nothing
    /// to answer), `Err` when the block exceeds the configured limit.
    fn read_headers(
        &self,
        buffer: &mut Vec<u8>,
        ctx: LogContext,
    ) -> Result<Option<usize>, FramingError> {
        let mut scratch = [0u8; HEADER_SCRATCH_SIZE];
        while buffer.len() < self.config.max_header_size {
            let received = match self.socket.recv(&mut scratch) {
                Ok(0) => {
                    log_info!(ctx, "connection closed by client");
                    return Ok(None);
                }
                Ok(received) => received,
                Err(error) if is_timeout(&error) => {
                    log_warn!(ctx, "recv timeout");
                    return Ok(None);
                }
                Err(error) => {
                    log_error!(ctx, "recv error", error => error);
                    return Ok(None);
                }
            };
            buffer.extend_from_slice(&scratch[..received]);

            if let Some(pos) = find(buffer, b"\r\n\r\n") {
                return Ok(Some(pos + 4));
            }
            if let Some(pos) = find(buffer, b"\n\n") {
                buffer.splice(pos..pos + 2, b"\r\n\r\n".iter().copied());
                return Ok(Some(pos + 4));
            }
        }
        log_error!(ctx, "headers too large", limit => self.config.max_header_size);
        Err(FramingError::HeadersTooLarge)
    }

    /// Read until the buffer holds at least `target` bytes.
    fn read_until(&self, buffer: &mut Vec<u8>, target: usize, ctx: LogContext) -> bool {
        let mut scratch = [0u8; BODY_SCRATCH_SIZE];
        while buffer.len() < target {
            match self.socket.recv(&mut scratch) {
                Ok(0) => {
                    log_error!(ctx, "eof during body read", have => buffer.len(), want => target);
                    return false;
                }
                Ok(received) => buffer.extend_from_slice(&scratch[..received]),
                Err(error) => {
                    log_error!(ctx, "recv error during body read", error => error);
                    return false;
                }
            }
        }
        true
    }

    fn reject(&self, violation: FramingError, ctx: LogContext) {
        log_error!(ctx, "framing violation", detail => violation.message());
        self.send_400(violation.message(), ctx);
    }

    fn send_400(&self, message: &str, ctx: LogContext) {
        let mut response = Response::new(StatusCode::BAD_REQUEST, message, "text/plain");
        response.set_header("Connection", "close");
        if let Err(error) = self.write_response(&response, ctx) {
            log_error!(ctx, "failed to write error response", error => error);
        }
        self.linger_close();
    }

    /// Drain unread input before the socket drops. Closing with bytes
    /// still queued in the kernel resets the connection and can
    /// destroy the error response in flight.
    fn linger_close(&self) {
        self.socket.shutdown_write();
        let _ = self.socket.set_recv_timeout(Duration::from_millis(200));
        let mut scratch = [0u8; 256];
        for _ in 0..64 {
            match self.socket.recv(&mut scratch) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    }

    /// Serialize and send a response. Inline bodies go out in one
    /// buffer; stream bodies send the header block and then copy the
    /// file region in bounded chunks.
    fn write_response(&self, response: &Response, ctx: LogContext) -> io::Result<()> {
        match &response.body {
            ResponseBody::Bytes(_) => {
                let wire = serialize(response);
                self.write_all(&wire)?;
                log_info!(
                    ctx,
                    "response sent",
                    status => response.status.as_u16(),
                    bytes => wire.len()
                );
                Ok(())
            }
            ResponseBody::Stream(descriptor) => {
                let mut file = match std::fs::File::open(&descriptor.path) {
                    Ok(file) => file,
                    Err(error) => {
                        // Headers have not gone out yet; a clean 500
                        // can still be written.
                        log_error!(
                            ctx,
                            "failed to open file for streaming",
                            path => descriptor.path.display(),
                            error => error
                        );
                        let failure = Response::json_error(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "Failed to stream file",
                        );
                        self.write_all(&serialize(&failure))?;
                        return Ok(());
                    }
                };

                self.write_all(&serialize_headers_only(response))?;

                file.seek(SeekFrom::Start(descriptor.offset))?;
                let mut chunk = vec![0u8; self.config.stream_buffer_size];
                let mut sent: u64 = 0;
                while sent < descriptor.total_bytes {
                    let want = (descriptor.total_bytes - sent).min(chunk.len() as u64) as usize;
                    let read = file.read(&mut chunk[..want])?;
                    if read == 0 {
                        break;
                    }
                    self.write_all(&chunk[..read])?;
                    sent += read as u64;
                    log_debug!(
                        ctx,
                        "streamed chunk",
                        bytes => read,
                        remaining => descriptor.total_bytes - sent
                    );
                }
                log_info!(
                    ctx,
                    "response sent (streamed)",
                    status => response.status.as_u16(),
                    bytes => sent
                );
                Ok(())
            }
        }
    }

    /// Send with a partial-write retry loop.
    fn write_all(&self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            let written = self.socket.send(data)?;
            if written == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "socket closed while writing",
                ));
            }
            data = &data[written..];
        }
        Ok(())
    }
}

/// Extract the header block starting at the beginning of `input`,
/// normalizing a bare `\n\n` terminator. Returns the block (always
/// `\r\n\r\n`-terminated) and the number of input bytes it covers.
fn split_header_block(input: &[u8]) -> Option<(Vec<u8>, usize)> {
    if let Some(pos) = find(input, b"\r\n\r\n") {
        return Some((input[..pos + 4].to_vec(), pos + 4));
    }
    if let Some(pos) = find(input, b"\n\n") {
        let mut block = input[..pos].to_vec();
        block.extend_from_slice(b"\r\n\r\n");
        return Some((block, pos + 2));
    }
    None
}

/// Count and bound Content-Length occurrences in a header block.
///
/// Zero occurrences means no body; two or more are a framing error
/// regardless of their values.
fn scan_content_length(header_block: &[u8], max_content_length: usize) -> Result<usize, FramingError> {
    let text = String::from_utf8_lossy(header_block).to_ascii_lowercase();
    let occurrences: Vec<usize> = text
        .match_indices("content-length:")
        .map(|(pos, _)| pos)
        .collect();

    match occurrences.len() {
        0 => Ok(0),
        1 => {
            let after = &text[occurrences[0] + "content-length:".len()..];
            let value = after
                .trim_start_matches([' ', '\t'])
                .chars()
                .take_while(char::is_ascii_digit)
                .collect::<String>();
            if value.is_empty() {
                return Err(FramingError::InvalidContentLength);
            }
            let length: usize = value
                .parse()
                .map_err(|_| FramingError::InvalidContentLength)?;
            if length > max_content_length {
                return Err(FramingError::ContentLengthTooLarge);
            }
            Ok(length)
        }
        _ => Err(FramingError::MultipleContentLength),
    }
}

fn trim_trailing_whitespace(body: &mut Vec<u8>) {
    while body.last().is_some_and(u8::is_ascii_whitespace) {
        body.pop();
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Content-Length scanning
    // ========================================================================

    #[test]
    fn no_content_length_means_empty_body() {
        assert_eq!(scan_content_length(b"Host: x\r\n\r\n", 1024), Ok(0));
    }

    #[test]
    fn single_content_length_is_parsed() {
        assert_eq!(
            scan_content_length(b"Content-Length: 42\r\n\r\n", 1024),
            Ok(42)
        );
    }

    #[test]
    fn content_length_lookup_is_case_insensitive() {
        assert_eq!(
            scan_content_length(b"CONTENT-LENGTH: 7\r\n\r\n", 1024),
            Ok(7)
        );
    }

    #[test]
    fn duplicate_content_length_is_rejected_even_when_equal() {
        let block = b"Content-Length: 5\r\nContent-Length: 5\r\n\r\n";
        assert_eq!(
            scan_content_length(block, 1024),
            Err(FramingError::MultipleContentLength)
        );
    }

    #[test]
    fn oversized_content_length_is_rejected() {
        assert_eq!(
            scan_content_length(b"Content-Length: 2048\r\n\r\n", 1024),
            Err(FramingError::ContentLengthTooLarge)
        );
    }

    #[test]
    fn non_numeric_content_length_is_rejected() {
        assert_eq!(
            scan_content_length(b"Content-Length: abc\r\n\r\n", 1024),
            Err(FramingError::InvalidContentLength)
        );
    }

    // ========================================================================
    // Header-block splitting
    // ========================================================================

    #[test]
    fn crlf_terminator_is_found() {
        let (block, consumed) = split_header_block(b"GET / HTTP/1.1\r\nHost: x\r\n\r\nrest").unwrap();
        assert!(block.ends_with(b"\r\n\r\n"));
        assert_eq!(consumed, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n".len());
        assert_eq!(block, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
    }

    #[test]
    fn bare_lf_terminator_is_normalized() {
        let (block, consumed) = split_header_block(b"GET / HTTP/1.1\nHost: x\n\nrest").unwrap();
        assert!(block.ends_with(b"\r\n\r\n"));
        // Consumed counts the original two-byte terminator.
        assert_eq!(consumed, b"GET / HTTP/1.1\nHost: x\n\n".len());
    }

    #[test]
    fn missing_terminator_yields_none() {
        assert!(split_header_block(b"GET / HTTP/1.1\r\nHost: x\r\n").is_none());
    }

    // ========================================================================
    // Body trimming
    // ========================================================================

    #[test]
    fn trailing_whitespace_is_trimmed() {
        let mut body = b"{\"a\": 1}  \r\n\t".to_vec();
        trim_trailing_whitespace(&mut body);
        assert_eq!(body, b"{\"a\": 1}");
    }

    #[test]
    fn interior_whitespace_is_preserved() {
        let mut body = b"a b\nc".to_vec();
        trim_trailing_whitespace(&mut body);
        assert_eq!(body, b"a b\nc");
    }
}
