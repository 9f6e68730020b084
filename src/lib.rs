//! gatehouse: TCP connection acceptance with a threaded task dispatcher.

pub mod config;
pub mod dispatch;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod server;

pub use config::ServerConfig;
pub use dispatch::{Dispatcher, ThreadedDispatcher};
pub use lifecycle::Shutdown;
pub use server::{Acceptor, Channel, ServerError};
