//! Socket wrappers.
//!
//! [`Socket`] owns one accepted stream; dropping it closes the
//! descriptor exactly once, and moving it transfers ownership. Reads
//! and writes are blocking, bounded by per-socket timeouts; a timeout
//! surfaces as a recoverable condition distinct from hard I/O errors
//! (see [`is_timeout`]).
//!
//! [`Listener`] wraps the bound listening socket in nonblocking mode
//! so [`Listener::poll_accept`] can act as a readiness probe: an
//! accept attempt that would block sleeps for the poll interval and
//! returns, letting the caller observe the shutdown flag between
//! cycles.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::time::Duration;

use hearth_core::request::HostAddress;

/// Returns true for the recoverable would-block/timed-out conditions
/// produced by socket timeouts.
#[must_use]
pub fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// An owned client stream socket.
#[derive(Debug)]
pub struct Socket {
    stream: TcpStream,
    peer: HostAddress,
}

impl Socket {
    /// Wrap an accepted stream, capturing the peer address.
    #[must_use]
    pub fn new(stream: TcpStream) -> Self {
        let peer = match stream.peer_addr() {
            Ok(addr) => HostAddress::new(addr.ip().to_string(), addr.port()),
            Err(_) => HostAddress::unknown(),
        };
        Self { stream, peer }
    }

    /// The peer's `host:port`.
    #[must_use]
    pub fn peer(&self) -> &HostAddress {
        &self.peer
    }

    /// Write some bytes; not guaranteed to write everything. Callers
    /// loop until the buffer is exhausted or a hard error occurs.
    pub fn send(&self, data: &[u8]) -> io::Result<usize> {
        (&self.stream).write(data)
    }

    /// Read up to `buffer.len()` bytes. `Ok(0)` signals EOF.
    pub fn recv(&self, buffer: &mut [u8]) -> io::Result<usize> {
        (&self.stream).read(buffer)
    }

    /// Bound blocking reads.
    pub fn set_recv_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.stream.set_read_timeout(Some(timeout))
    }

    /// Bound blocking writes.
    pub fn set_send_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.stream.set_write_timeout(Some(timeout))
    }

    /// Close the read half.
    pub fn shutdown_read(&self) {
        let _ = self.stream.shutdown(Shutdown::Read);
    }

    /// Close the write half.
    pub fn shutdown_write(&self) {
        let _ = self.stream.shutdown(Shutdown::Write);
    }
}

/// A bound, listening TCP socket with a polling accept.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Bind and listen on `host:port`.
    ///
    /// The standard library sets `SO_REUSEADDR` on Unix and applies
    /// its own listen backlog. The listener is switched to nonblocking
    /// mode so accepts can be polled.
    pub fn bind(host: &str, port: u16) -> io::Result<Self> {
        let inner = TcpListener::bind((host, port))?;
        inner.set_nonblocking(true)?;
        Ok(Self { inner })
    }

    /// The bound local address (useful when binding port 0).
    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.inner.local_addr()
    }

    /// Readiness probe: accept one connection if pending.
    ///
    /// Returns `Ok(None)` after sleeping `poll_interval` when no
    /// connection is waiting, so the caller re-checks its running flag
    /// at least that often.
    pub fn poll_accept(&self, poll_interval: Duration) -> io::Result<Option<Socket>> {
        match self.inner.accept() {
            Ok((stream, _addr)) => {
                // Accepted sockets must block; the listener alone is
                // nonblocking.
                stream.set_nonblocking(false)?;
                Ok(Some(Socket::new(stream)))
            }
            Err(error) if is_timeout(&error) => {
                std::thread::sleep(poll_interval);
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}
