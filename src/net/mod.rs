//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured host:port
//!     → listener.rs (resolve, bind, listen with fixed backlog, accept)
//!     → connection.rs (connection IDs, socket options, release)
//!     → Hand off to the acceptor as a new channel
//!
//! hostname.rs resolves the server name advertised for the bound host.
//! ```
//!
//! # Design Decisions
//! - Sockets are reached through small traits so the acceptor can be
//!   exercised without real network I/O
//! - Option failures never drop a connection

pub mod connection;
pub mod hostname;
pub mod listener;

pub use connection::{ConnectionId, ConnectionSocket};
pub use hostname::ServerNameResolver;
pub use listener::{ListenSocket, LISTEN_BACKLOG};
