//! Server configuration and accept loop.
//!
//! The listener runs on the calling thread. Each accepted connection
//! is wrapped in a [`Connection`] and enqueued on the worker pool;
//! a worker drives that connection from first byte to close. The
//! accept loop re-checks the shutdown flag every poll interval, so a
//! flipped flag takes effect within one cycle.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use hearth_core::logging::LogContext;
use hearth_core::pool::WorkerPool;
use hearth_core::routing::Router;
use hearth_core::shutdown::ShutdownFlag;
use hearth_core::{log_error, log_info};

use crate::connection::{Connection, ConnectionConfig};
use crate::socket::Listener;

/// Default listener poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Worker count default: `max(4, 2 x available parallelism)`.
#[must_use]
pub fn default_worker_count() -> usize {
    let parallelism = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    (2 * parallelism).max(4)
}

/// Server configuration. Built programmatically; there is no CLI or
/// environment layer in the core.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,
    /// Port to bind (0 picks an ephemeral port).
    pub port: u16,
    /// Worker thread count.
    pub workers: usize,
    /// Listener readiness-probe interval.
    pub poll_interval: Duration,
    /// Per-socket receive timeout.
    pub recv_timeout: Duration,
    /// Per-socket send timeout.
    pub send_timeout: Duration,
    /// Maximum header block size per request.
    pub max_header_size: usize,
    /// Maximum request body size.
    pub max_content_length: usize,
    /// Maximum requests per connection.
    pub max_requests: usize,
    /// Chunk size for streamed responses.
    pub stream_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let connection = ConnectionConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: default_worker_count(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            recv_timeout: connection.recv_timeout,
            send_timeout: connection.send_timeout,
            max_header_size: connection.max_header_size,
            max_content_length: connection.max_content_length,
            max_requests: connection.max_requests,
            stream_buffer_size: connection.stream_buffer_size,
        }
    }
}

impl ServerConfig {
    /// Configuration bound to `host:port` with defaults elsewhere.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Set the worker thread count.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the listener poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the per-socket receive timeout.
    #[must_use]
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Set the per-socket send timeout.
    #[must_use]
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the maximum header block size.
    #[must_use]
    pub fn with_max_header_size(mut self, size: usize) -> Self {
        self.max_header_size = size;
        self
    }

    /// Set the maximum request body size.
    #[must_use]
    pub fn with_max_content_length(mut self, size: usize) -> Self {
        self.max_content_length = size;
        self
    }

    /// Set the per-connection request limit.
    #[must_use]
    pub fn with_max_requests(mut self, max: usize) -> Self {
        self.max_requests = max;
        self
    }

    /// Set the streamed-response chunk size.
    #[must_use]
    pub fn with_stream_buffer_size(mut self, size: usize) -> Self {
        self.stream_buffer_size = size;
        self
    }

    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            recv_timeout: self.recv_timeout,
            send_timeout: self.send_timeout,
            max_requests: self.max_requests,
            max_header_size: self.max_header_size,
            max_content_length: self.max_content_length,
            stream_buffer_size: self.stream_buffer_size,
        }
    }
}

/// Server error.
#[derive(Debug)]
pub enum ServerError {
    /// Binding the listener failed; fatal.
    Bind(io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bind(error) => write!(f, "failed to bind listener: {error}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind(error) => Some(error),
        }
    }
}

/// A bound server, ready to run its accept loop.
pub struct Server {
    config: ServerConfig,
    router: Arc<Router>,
    listener: Listener,
    shutdown: ShutdownFlag,
}

impl Server {
    /// Bind the listener. Routes and middleware must already be
    /// installed on the router; it is immutable from here on.
    pub fn bind(config: ServerConfig, router: Arc<Router>) -> Result<Self, ServerError> {
        let listener = Listener::bind(&config.host, config.port).map_err(ServerError::Bind)?;
        Ok(Self {
            config,
            router,
            listener,
            shutdown: ShutdownFlag::new(),
        })
    }

    /// The actually bound address (resolves port 0).
    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle for requesting shutdown from another thread or a signal
    /// handler.
    #[must_use]
    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    /// Run the accept loop until shutdown is requested.
    ///
    /// Accept failures are logged and the loop continues; only bind
    /// failures (in [`bind`][Self::bind]) are fatal. On exit the
    /// listener closes and the pool stops, letting in-flight
    /// connections finish their current request.
    pub fn run(self) {
        let ctx = LogContext::server();
        log_info!(
            ctx,
            "server listening",
            addr => self
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| format!("{}:{}", self.config.host, self.config.port)),
            workers => self.config.workers
        );

        let pool = WorkerPool::new(self.config.workers);

        while !self.shutdown.is_triggered() {
            match self.listener.poll_accept(self.config.poll_interval) {
                Ok(Some(socket)) => {
                    log_info!(ctx, "connection accepted", peer => socket.peer());
                    let connection = Connection::new(
                        socket,
                        self.config.connection_config(),
                        Arc::clone(&self.router),
                    );
                    pool.enqueue(move || connection.run());
                }
                Ok(None) => {}
                Err(error) => {
                    log_error!(ctx, "accept failed", error => error);
                }
            }
        }

        log_info!(ctx, "server shutting down");
        drop(self.listener);
        pool.stop();
        pool.wait_for_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::cache::FileCache;

    #[test]
    fn default_worker_count_has_floor() {
        assert!(default_worker_count() >= 4);
    }

    #[test]
    fn config_builder_chains() {
        let config = ServerConfig::new("127.0.0.1", 9000)
            .with_workers(2)
            .with_max_requests(10)
            .with_poll_interval(Duration::from_millis(50))
            .with_max_header_size(4096);

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.workers, 2);
        assert_eq!(config.max_requests, 10);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.max_header_size, 4096);
    }

    #[test]
    fn connection_config_snapshot_matches() {
        let config = ServerConfig::default()
            .with_recv_timeout(Duration::from_secs(3))
            .with_stream_buffer_size(1024);
        let snapshot = config.connection_config();
        assert_eq!(snapshot.recv_timeout, Duration::from_secs(3));
        assert_eq!(snapshot.stream_buffer_size, 1024);
        assert_eq!(snapshot.max_requests, 100);
    }

    #[test]
    fn shutdown_stops_the_accept_loop() {
        let router = Arc::new(Router::new(Arc::new(FileCache::new(4))));
        let config = ServerConfig::new("127.0.0.1", 0)
            .with_workers(1)
            .with_poll_interval(Duration::from_millis(10));
        let server = Server::bind(config, router).unwrap();
        let shutdown = server.shutdown_flag();

        let handle = std::thread::spawn(move || server.run());
        shutdown.trigger();
        handle.join().expect("server thread panicked");
    }

    #[test]
    fn bind_failure_is_reported() {
        let router = Arc::new(Router::new(Arc::new(FileCache::new(4))));
        let first = Server::bind(ServerConfig::new("127.0.0.1", 0), Arc::clone(&router)).unwrap();
        let port = first.local_addr().unwrap().port();

        let second = Server::bind(ServerConfig::new("127.0.0.1", port), router);
        assert!(matches!(second, Err(ServerError::Bind(_))));
    }
}
