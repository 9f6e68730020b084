//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use socket2::Socket;

use gatehouse::config::{ServerConfig, SocketOption};
use gatehouse::dispatch::{Task, TaskError, ThreadedDispatcher};
use gatehouse::lifecycle::Shutdown;
use gatehouse::server::{
    Acceptor, Channel, ChannelFactory, EventLoop, Registry, ServerHandle,
};

/// Loopback config with short timers suited to tests.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        connection_limit: 8,
        socket_options: vec![SocketOption::TcpNoDelay(true)],
        cleanup_interval: 0.05,
        channel_timeout: 30.0,
        threads: 2,
        poll_timeout: 0.02,
        shutdown_timeout: 2.0,
        ..ServerConfig::default()
    }
}

/// A server running its event loop on a background thread.
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Registry<Socket>,
    shutdown: Arc<Shutdown>,
    thread: Option<JoinHandle<bool>>,
}

impl TestServer {
    pub fn start(config: ServerConfig, factory: impl ChannelFactory<Socket> + 'static) -> Self {
        let config = config.into_validated().unwrap();
        let dispatcher = Arc::new(ThreadedDispatcher::new(config.threads));
        let mut acceptor = Acceptor::bind(Arc::clone(&config), dispatcher, factory).unwrap();
        let addr = acceptor.local_addr().unwrap();
        let registry = acceptor.registry().clone();

        let shutdown = Arc::new(Shutdown::new());
        let loop_shutdown = Arc::clone(&shutdown);
        let thread = thread::spawn(move || {
            let mut event_loop = EventLoop::new(config.poll_timeout()).unwrap();
            event_loop.run(&mut acceptor, &loop_shutdown).unwrap();
            acceptor.shutdown(config.cancel_pending_on_shutdown, config.shutdown_timeout())
        });

        Self {
            addr,
            registry,
            shutdown,
            thread: Some(thread),
        }
    }

    pub fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    /// Stop the loop and return whether the dispatcher drained in time.
    pub fn stop(mut self) -> bool {
        self.shutdown.trigger();
        self.thread.take().map(|t| t.join().unwrap()).unwrap_or(true)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

/// Reads one chunk, writes it back, then closes the channel.
pub struct EchoOnce {
    channel: Arc<Channel<Socket>>,
}

impl Task for EchoOnce {
    fn service(self: Box<Self>) -> Result<(), TaskError> {
        self.channel.set_will_close();
        self.channel
            .with_socket(|socket| -> std::io::Result<()> {
                let mut socket: &Socket = socket;
                let mut buf = [0u8; 64];
                let n = socket.read(&mut buf)?;
                socket.write_all(&buf[..n])
            })
            .unwrap_or(Ok(()))?;
        Ok(())
    }
}

pub struct EchoFactory;

impl ChannelFactory<Socket> for EchoFactory {
    fn new_channel(
        &self,
        server: &ServerHandle<Socket>,
        socket: Socket,
        peer: Option<SocketAddr>,
        _config: &Arc<ServerConfig>,
    ) -> Arc<Channel<Socket>> {
        let channel = Channel::new(server, socket, peer);
        channel.add_task(Box::new(EchoOnce {
            channel: Arc::clone(&channel),
        }));
        channel
    }
}
