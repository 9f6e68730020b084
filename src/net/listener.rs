//! Listening socket seam.
//!
//! # Responsibilities
//! - Resolve the configured host:port
//! - Create, bind and listen on the TCP socket
//! - Accept incoming connections without blocking
//!
//! The acceptor only talks to [`ListenSocket`], so tests can substitute a
//! recording double for the real `socket2::Socket`.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::net::connection::ConnectionSocket;

/// Backlog handed to `listen(2)` for every listening socket.
pub const LISTEN_BACKLOG: i32 = 1024;

/// Operations the acceptor needs from its listening socket.
pub trait ListenSocket: Send {
    /// Socket type produced by a successful accept.
    type Stream: ConnectionSocket;

    /// Create an unbound socket suitable for `addr`.
    fn open(addr: &SocketAddr) -> io::Result<Self>
    where
        Self: Sized;

    fn bind(&self, addr: SocketAddr) -> io::Result<()>;

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;

    fn listen(&self, backlog: i32) -> io::Result<()>;

    /// Accept one pending connection.
    ///
    /// Returns `ErrorKind::WouldBlock` when nothing is queued.
    fn accept(&self) -> io::Result<(Self::Stream, Option<SocketAddr>)>;

    fn local_addr(&self) -> io::Result<Option<SocketAddr>>;
}

impl ListenSocket for Socket {
    type Stream = Socket;

    fn open(addr: &SocketAddr) -> io::Result<Self> {
        tcp_socket(addr)
    }

    fn bind(&self, addr: SocketAddr) -> io::Result<()> {
        Socket::bind(self, &SockAddr::from(addr))
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        Socket::set_nonblocking(self, nonblocking)
    }

    fn listen(&self, backlog: i32) -> io::Result<()> {
        Socket::listen(self, backlog)
    }

    fn accept(&self) -> io::Result<(Socket, Option<SocketAddr>)> {
        let (stream, addr) = Socket::accept(self)?;
        Ok((stream, addr.as_socket()))
    }

    fn local_addr(&self) -> io::Result<Option<SocketAddr>> {
        Ok(Socket::local_addr(self)?.as_socket())
    }
}

/// Resolve "host:port" to the first usable socket address.
pub fn resolve(bind_address: &str) -> io::Result<SocketAddr> {
    bind_address
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "Can not parse SocketAddr"))
}

/// Create an unbound TCP socket for the address family of `addr`.
pub fn tcp_socket(addr: &SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(*addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    Ok(socket)
}
