//! Server construction and startup errors.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to resolve {address}: {source}")]
    Resolve { address: String, source: io::Error },

    #[error("Failed to create socket for {addr}: {source}")]
    Socket { addr: SocketAddr, source: io::Error },

    #[error("Failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("Failed to listen on {addr}: {source}")]
    Listen { addr: SocketAddr, source: io::Error },
}
