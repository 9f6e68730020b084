//! Accepted connection sockets.
//!
//! # Responsibilities
//! - Generate unique connection IDs used as registry keys
//! - Apply configured socket options to accepted sockets
//! - Release the socket when its channel closes

use std::io;
use std::net::Shutdown;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use socket2::Socket;

use crate::config::SocketOption;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Operations the server performs on an accepted connection socket.
///
/// Reading and writing belong to the protocol layer and are not part of
/// this trait.
pub trait ConnectionSocket: Send + 'static {
    /// Apply one socket option.
    fn set_option(&self, option: &SocketOption) -> io::Result<()>;

    /// Shut down both directions ahead of dropping the socket.
    fn shutdown(&self) -> io::Result<()>;
}

impl ConnectionSocket for Socket {
    fn set_option(&self, option: &SocketOption) -> io::Result<()> {
        match *option {
            SocketOption::TcpNoDelay(on) => self.set_tcp_nodelay(on),
            SocketOption::KeepAlive(on) => self.set_keepalive(on),
            SocketOption::ReuseAddress(on) => self.set_reuse_address(on),
            SocketOption::RecvBufferSize(size) => self.set_recv_buffer_size(size),
            SocketOption::SendBufferSize(size) => self.set_send_buffer_size(size),
            SocketOption::Linger(secs) => self.set_linger(Some(Duration::from_secs(secs))),
        }
    }

    fn shutdown(&self) -> io::Result<()> {
        Socket::shutdown(self, Shutdown::Both)
    }
}
