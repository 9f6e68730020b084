//! gatehouse: a TCP connection acceptor with a threaded task dispatcher.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────┐
//!                     │                    GATEHOUSE                      │
//!                     │                                                   │
//!   Client connect    │  ┌────────────┐   ┌──────────┐   ┌────────────┐  │
//!   ──────────────────┼─▶│ event loop │──▶│ acceptor │──▶│  registry  │  │
//!                     │  │   (mio)    │   │          │   │ (channels) │  │
//!                     │  └────────────┘   └────┬─────┘   └─────┬──────┘  │
//!                     │                        │               │         │
//!                     │                        ▼               ▼         │
//!                     │                  ┌──────────┐    ┌──────────┐    │
//!                     │                  │ dispatch │◀───│ channel  │    │
//!                     │                  │ workers  │    │  tasks   │    │
//!                     │                  └──────────┘    └──────────┘    │
//!                     │                                                   │
//!                     │  config · observability · lifecycle               │
//!                     └──────────────────────────────────────────────────┘
//! ```
//!
//! The binary attaches a minimal protocol: every accepted client receives a
//! one-line greeting naming the server, then the connection stays open
//! until the idle timeout reaps it.

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use socket2::Socket;

use gatehouse::config::{load_config, ServerConfig};
use gatehouse::dispatch::{Task, TaskError, ThreadedDispatcher};
use gatehouse::lifecycle::Shutdown;
use gatehouse::observability::{logging, metrics};
use gatehouse::server::{Acceptor, Channel, ChannelFactory, EventLoop, ServerHandle};

#[derive(Debug, Parser)]
#[command(name = "gatehouse", version, about = "TCP connection acceptor")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind, overrides the config file
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overrides the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Worker thread count, overrides the config file
    #[arg(short, long)]
    threads: Option<usize>,
}

/// Writes the greeting line to a newly accepted client.
struct Greeting {
    channel: Arc<Channel<Socket>>,
}

impl Task for Greeting {
    fn service(self: Box<Self>) -> Result<(), TaskError> {
        let line = format!("{} ready\r\n", self.channel.server().server_name());
        self.channel
            .with_socket(|socket| {
                let mut socket: &Socket = socket;
                socket.write_all(line.as_bytes())
            })
            .unwrap_or(Ok(()))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "greeting"
    }
}

struct GreetingFactory;

impl ChannelFactory<Socket> for GreetingFactory {
    fn new_channel(
        &self,
        server: &ServerHandle<Socket>,
        socket: Socket,
        peer: Option<SocketAddr>,
        _config: &Arc<ServerConfig>,
    ) -> Arc<Channel<Socket>> {
        let channel = Channel::new(server, socket, peer);
        channel.add_task(Box::new(Greeting {
            channel: Arc::clone(&channel),
        }));
        channel
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    let config = config.into_validated()?;

    logging::init(&config.observability.log_level);
    tracing::info!("gatehouse v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.bind_address(),
        connection_limit = config.connection_limit,
        threads = config.threads,
        channel_timeout_secs = config.channel_timeout,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let dispatcher = Arc::new(ThreadedDispatcher::new(config.threads));
    let mut acceptor = Acceptor::bind(Arc::clone(&config), dispatcher, GreetingFactory)?;
    let mut event_loop = EventLoop::new(config.poll_timeout())?;

    let shutdown = Arc::new(Shutdown::new());
    let loop_shutdown = Arc::clone(&shutdown);
    let loop_config = Arc::clone(&config);
    let mut server = tokio::task::spawn_blocking(move || {
        let result = event_loop.run(&mut acceptor, &loop_shutdown);
        let drained = acceptor.shutdown(
            loop_config.cancel_pending_on_shutdown,
            loop_config.shutdown_timeout(),
        );
        if !drained {
            tracing::warn!("Workers still busy at shutdown deadline");
        }
        result
    });

    tokio::select! {
        result = &mut server => {
            result??;
            tracing::info!("Shutdown complete");
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Shutdown signal received");
        }
    }

    shutdown.trigger();
    server.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
