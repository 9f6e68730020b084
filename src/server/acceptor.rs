//! Listening socket owner and connection admission.
//!
//! # Responsibilities
//! - Bind and listen on the configured address
//! - Accept connections while below the connection limit
//! - Apply socket options and register a channel per connection
//! - Run idle-channel cleanup on a fixed interval
//!
//! # Design Decisions
//! - Backpressure: at the limit the listener stops reporting readable
//!   interest, so pending connections wait in the kernel backlog
//! - Accept errors never stop the loop; transient ones are silent
//! - Cleanup runs from `readable`, which the event loop calls on every
//!   pass, so it needs no timer of its own

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::validation::validate_config;
use crate::config::{ConfigError, ServerConfig};
use crate::dispatch::{Dispatcher, Task};
use crate::net::listener::{self, ListenSocket, LISTEN_BACKLOG};
use crate::net::{ConnectionSocket, ServerNameResolver};
use crate::observability::metrics;
use crate::server::channel::ChannelFactory;
use crate::server::clock::{Clock, MonotonicClock};
use crate::server::error::ServerError;
use crate::server::handle::ServerHandle;
use crate::server::reaper;
use crate::server::registry::Registry;

/// Readiness callbacks driven by the event loop.
pub trait EventHooks {
    /// Whether the loop should watch for readability.
    fn readable(&mut self) -> bool;

    /// Whether the loop should watch for writability.
    fn writable(&mut self) -> bool;

    fn handle_read(&mut self);

    fn handle_connect(&mut self);

    /// A connection is (probably) waiting to be accepted.
    fn handle_accept(&mut self);
}

/// The server's listening endpoint.
pub struct Acceptor<L: ListenSocket> {
    socket: L,
    addr: SocketAddr,
    config: Arc<ServerConfig>,
    handle: ServerHandle<L::Stream>,
    factory: Box<dyn ChannelFactory<L::Stream>>,
    resolver: ServerNameResolver,
    accepting: bool,
    next_cleanup_deadline: Duration,
}

impl Acceptor<socket2::Socket> {
    /// Create, bind and start listening on a fresh TCP socket.
    pub fn bind(
        config: Arc<ServerConfig>,
        dispatcher: Arc<dyn Dispatcher>,
        factory: impl ChannelFactory<socket2::Socket> + 'static,
    ) -> Result<Self, ServerError> {
        Self::new(config, dispatcher, factory, None, true)
    }
}

impl<L: ListenSocket> Acceptor<L> {
    /// Build an acceptor around `socket`, or a new one when `None`.
    ///
    /// With `start` set the socket is bound and put in listening mode
    /// before returning.
    pub fn new(
        config: Arc<ServerConfig>,
        dispatcher: Arc<dyn Dispatcher>,
        factory: impl ChannelFactory<L::Stream> + 'static,
        socket: Option<L>,
        start: bool,
    ) -> Result<Self, ServerError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let address = config.bind_address();
        let addr = listener::resolve(&address)
            .map_err(|source| ServerError::Resolve { address, source })?;
        let socket = match socket {
            Some(socket) => socket,
            None => L::open(&addr).map_err(|source| ServerError::Socket { addr, source })?,
        };

        let resolver = ServerNameResolver::new();
        let server_name = resolver.resolve(&config.host);
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let next_cleanup_deadline = clock.now().saturating_add(config.cleanup_interval());
        let handle = ServerHandle::new(Registry::new(), dispatcher, clock, server_name);

        let mut acceptor = Self {
            socket,
            addr,
            config,
            handle,
            factory: Box::new(factory),
            resolver,
            accepting: false,
            next_cleanup_deadline,
        };
        if start {
            acceptor.start()?;
        }
        Ok(acceptor)
    }

    /// Replace the time source. Resets the cleanup deadline.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.next_cleanup_deadline = clock.now().saturating_add(self.config.cleanup_interval());
        self.handle.set_clock(clock);
        self
    }

    /// Bind, switch to non-blocking mode and listen.
    pub fn start(&mut self) -> Result<(), ServerError> {
        if self.accepting {
            return Ok(());
        }
        let addr = self.addr;

        self.socket
            .bind(addr)
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.socket
            .set_nonblocking(true)
            .map_err(|source| ServerError::Listen { addr, source })?;
        self.socket
            .listen(LISTEN_BACKLOG)
            .map_err(|source| ServerError::Listen { addr, source })?;
        self.accepting = true;

        info!(
            address = %self.local_addr().unwrap_or(addr),
            server_name = %self.handle.server_name(),
            backlog = LISTEN_BACKLOG,
            "Listening for connections"
        );
        Ok(())
    }

    /// Name advertised for `ip`; empty means this machine.
    pub fn get_server_name(&self, ip: &str) -> String {
        self.resolver.resolve(ip)
    }

    /// Name advertised for the configured host.
    pub fn server_name(&self) -> &str {
        self.handle.server_name()
    }

    /// Forward a task to the dispatcher. Never runs it inline.
    pub fn add_task(&self, task: Box<dyn Task>) {
        self.handle.add_task(task);
    }

    /// Close channels idle at `now`. Returns how many were closed.
    pub fn maintenance(&self, now: Duration) -> usize {
        reaper::maintenance(self.handle.registry(), now, self.config.channel_timeout())
    }

    /// Actual bound address, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok().flatten()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    pub fn registry(&self) -> &Registry<L::Stream> {
        self.handle.registry()
    }

    pub fn handle(&self) -> &ServerHandle<L::Stream> {
        &self.handle
    }

    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    pub fn next_cleanup_deadline(&self) -> Duration {
        self.next_cleanup_deadline
    }

    pub fn set_next_cleanup_deadline(&mut self, deadline: Duration) {
        self.next_cleanup_deadline = deadline;
    }

    /// Stop accepting, stop the dispatcher and close every channel.
    ///
    /// Returns `false` if dispatcher workers outlived `timeout`.
    pub fn shutdown(&mut self, cancel_pending: bool, timeout: Duration) -> bool {
        self.accepting = false;
        let drained = self.handle.dispatcher().shutdown(cancel_pending, timeout);
        let closed = self.handle.registry().close_all();
        info!(closed, drained, "Acceptor stopped");
        drained
    }

    fn apply_socket_options(&self, socket: &L::Stream, peer: Option<SocketAddr>) {
        for option in &self.config.socket_options {
            if let Err(e) = socket.set_option(option) {
                warn!(peer = ?peer, option = %option, error = %e, "Failed to apply socket option");
            }
        }
    }
}

impl<L: ListenSocket> EventHooks for Acceptor<L> {
    fn readable(&mut self) -> bool {
        let now = self.handle.now();
        if now >= self.next_cleanup_deadline {
            self.maintenance(now);
            self.next_cleanup_deadline = now.saturating_add(self.config.cleanup_interval());
        }

        self.accepting && self.handle.registry().len() < self.config.connection_limit
    }

    fn writable(&mut self) -> bool {
        false
    }

    fn handle_read(&mut self) {}

    fn handle_connect(&mut self) {}

    fn handle_accept(&mut self) {
        let (socket, peer) = match self.socket.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                metrics::record_accept_error(error_kind(&e));
                if self.config.log_socket_errors {
                    warn!(error = %e, "Accept failed");
                }
                return;
            }
        };

        self.apply_socket_options(&socket, peer);

        let channel = self
            .factory
            .new_channel(&self.handle, socket, peer, &self.config);
        let id = channel.id();
        self.handle.registry().insert(channel);

        metrics::record_connection_accepted();
        debug!(
            connection_id = %id,
            peer = ?peer,
            active = self.handle.registry().len(),
            "Connection accepted"
        );
    }
}

#[cfg(unix)]
impl<L: ListenSocket + std::os::fd::AsRawFd> std::os::fd::AsRawFd for Acceptor<L> {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.socket.as_raw_fd()
    }
}

fn error_kind(e: &io::Error) -> &'static str {
    match e.kind() {
        io::ErrorKind::ConnectionAborted => "connection_aborted",
        io::ErrorKind::ConnectionReset => "connection_reset",
        io::ErrorKind::Interrupted => "interrupted",
        io::ErrorKind::PermissionDenied => "permission_denied",
        io::ErrorKind::OutOfMemory => "out_of_memory",
        _ => match e.raw_os_error() {
            Some(libc::EMFILE) | Some(libc::ENFILE) => "too_many_open_files",
            _ => "other",
        },
    }
}
