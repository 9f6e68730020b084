//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the server.
///
/// Shared as `Arc<ServerConfig>` once validated; nothing mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host name or address to bind (e.g., "0.0.0.0").
    pub host: String,

    /// TCP port to bind. `0` lets the OS pick one.
    pub port: u16,

    /// Maximum number of concurrently registered channels.
    pub connection_limit: usize,

    /// Options applied, in order, to every accepted connection socket.
    pub socket_options: Vec<SocketOption>,

    /// Seconds between idle-channel sweeps.
    pub cleanup_interval: f64,

    /// Seconds of inactivity before a channel may be force-closed.
    pub channel_timeout: f64,

    /// Log per-connection accept failures.
    pub log_socket_errors: bool,

    /// Number of task dispatcher worker threads.
    pub threads: usize,

    /// Seconds the host loop waits for readiness before re-checking state.
    pub poll_timeout: f64,

    /// Cancel queued tasks instead of draining them on shutdown.
    pub cancel_pending_on_shutdown: bool,

    /// Seconds to wait for workers to exit on shutdown.
    pub shutdown_timeout: f64,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            connection_limit: 100,
            socket_options: vec![SocketOption::TcpNoDelay(true)],
            cleanup_interval: 30.0,
            channel_timeout: 120.0,
            log_socket_errors: true,
            threads: 4,
            poll_timeout: 1.0,
            cancel_pending_on_shutdown: true,
            shutdown_timeout: 5.0,
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Address string handed to the resolver ("host:port").
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs_f64(self.cleanup_interval)
    }

    pub fn channel_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.channel_timeout)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.poll_timeout)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.shutdown_timeout)
    }
}

/// A socket option applied to accepted connections.
///
/// Each variant is one (level, option-name, value) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketOption {
    /// `IPPROTO_TCP` / `TCP_NODELAY`.
    TcpNoDelay(bool),
    /// `SOL_SOCKET` / `SO_KEEPALIVE`.
    KeepAlive(bool),
    /// `SOL_SOCKET` / `SO_REUSEADDR`.
    ReuseAddress(bool),
    /// `SOL_SOCKET` / `SO_RCVBUF`, in bytes.
    RecvBufferSize(usize),
    /// `SOL_SOCKET` / `SO_SNDBUF`, in bytes.
    SendBufferSize(usize),
    /// `SOL_SOCKET` / `SO_LINGER`, in seconds.
    Linger(u64),
}

impl SocketOption {
    /// Protocol level the option lives at.
    pub fn level(&self) -> &'static str {
        match self {
            SocketOption::TcpNoDelay(_) => "IPPROTO_TCP",
            SocketOption::KeepAlive(_)
            | SocketOption::ReuseAddress(_)
            | SocketOption::RecvBufferSize(_)
            | SocketOption::SendBufferSize(_)
            | SocketOption::Linger(_) => "SOL_SOCKET",
        }
    }

    /// Option name as the OS spells it.
    pub fn name(&self) -> &'static str {
        match self {
            SocketOption::TcpNoDelay(_) => "TCP_NODELAY",
            SocketOption::KeepAlive(_) => "SO_KEEPALIVE",
            SocketOption::ReuseAddress(_) => "SO_REUSEADDR",
            SocketOption::RecvBufferSize(_) => "SO_RCVBUF",
            SocketOption::SendBufferSize(_) => "SO_SNDBUF",
            SocketOption::Linger(_) => "SO_LINGER",
        }
    }
}

impl std::fmt::Display for SocketOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocketOption::TcpNoDelay(v)
            | SocketOption::KeepAlive(v)
            | SocketOption::ReuseAddress(v) => write!(f, "{}/{}={}", self.level(), self.name(), *v as u8),
            SocketOption::RecvBufferSize(v) | SocketOption::SendBufferSize(v) => {
                write!(f, "{}/{}={}", self.level(), self.name(), v)
            }
            SocketOption::Linger(v) => write!(f, "{}/{}={}", self.level(), self.name(), v),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
