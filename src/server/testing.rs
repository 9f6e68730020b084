//! Test doubles for the server module.

use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::{ServerConfig, SocketOption};
use crate::dispatch::{Dispatcher, Task};
use crate::net::{ConnectionSocket, ListenSocket};
use crate::server::channel::{Channel, ChannelFactory};
use crate::server::clock::ManualClock;
use crate::server::handle::ServerHandle;
use crate::server::registry::Registry;

/// Accepted-socket double recording the options applied to it.
#[derive(Default)]
pub struct DummySock {
    pub opts: Arc<Mutex<Vec<SocketOption>>>,
    pub shut: Arc<AtomicUsize>,
    pub fail_options: bool,
}

impl ConnectionSocket for DummySock {
    fn set_option(&self, option: &SocketOption) -> io::Result<()> {
        if self.fail_options {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "unsupported"));
        }
        self.opts.lock().push(option.clone());
        Ok(())
    }

    fn shutdown(&self) -> io::Result<()> {
        self.shut.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Listening-socket double.
#[derive(Default)]
pub struct DummyListener {
    pub bound: Mutex<Option<SocketAddr>>,
    pub listened: Mutex<Option<i32>>,
    pub nonblocking: AtomicBool,
    pub toraise: Mutex<Option<io::ErrorKind>>,
    pub accept_result: Mutex<Option<(DummySock, Option<SocketAddr>)>>,
    pub accepted: AtomicBool,
}

impl ListenSocket for DummyListener {
    type Stream = DummySock;

    fn open(_addr: &SocketAddr) -> io::Result<Self> {
        Ok(Self::default())
    }

    fn bind(&self, addr: SocketAddr) -> io::Result<()> {
        *self.bound.lock() = Some(addr);
        Ok(())
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.nonblocking.store(nonblocking, Ordering::SeqCst);
        Ok(())
    }

    fn listen(&self, backlog: i32) -> io::Result<()> {
        *self.listened.lock() = Some(backlog);
        Ok(())
    }

    fn accept(&self) -> io::Result<(DummySock, Option<SocketAddr>)> {
        if let Some(kind) = *self.toraise.lock() {
            return Err(io::Error::new(kind, "accept failed"));
        }
        match self.accept_result.lock().take() {
            Some(result) => {
                self.accepted.store(true, Ordering::SeqCst);
                Ok(result)
            }
            None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }

    fn local_addr(&self) -> io::Result<Option<SocketAddr>> {
        Ok(*self.bound.lock())
    }
}

/// Dispatcher that queues tasks for the test to run by hand.
#[derive(Default)]
pub struct RecordingDispatcher {
    tasks: Mutex<Vec<Box<dyn Task>>>,
    pub shutdowns: Mutex<Vec<(bool, Duration)>>,
}

impl RecordingDispatcher {
    pub fn take(&self) -> Vec<Box<dyn Task>> {
        std::mem::take(&mut *self.tasks.lock())
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn add_task(&self, task: Box<dyn Task>) {
        self.tasks.lock().push(task);
    }

    fn shutdown(&self, cancel_pending: bool, timeout: Duration) -> bool {
        self.shutdowns.lock().push((cancel_pending, timeout));
        true
    }
}

/// Dispatcher running every task on its own thread.
#[derive(Default)]
pub struct SpawningDispatcher {
    threads: Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl SpawningDispatcher {
    pub fn join_all(&self) {
        let threads = std::mem::take(&mut *self.threads.lock());
        for thread in threads {
            let _ = thread.join();
        }
    }
}

impl Dispatcher for SpawningDispatcher {
    fn add_task(&self, task: Box<dyn Task>) {
        let thread = std::thread::spawn(move || {
            let _ = task.service();
        });
        self.threads.lock().push(thread);
    }

    fn shutdown(&self, _cancel_pending: bool, _timeout: Duration) -> bool {
        self.join_all();
        true
    }
}

/// One factory call as seen by [`RecordingFactory`].
pub struct FactoryCall {
    pub registry: Registry<DummySock>,
    pub peer: Option<SocketAddr>,
    pub config: Arc<ServerConfig>,
    pub opts_at_construction: Vec<SocketOption>,
}

/// Channel factory recording its arguments.
#[derive(Clone, Default)]
pub struct RecordingFactory {
    pub calls: Arc<Mutex<Vec<FactoryCall>>>,
}

impl ChannelFactory<DummySock> for RecordingFactory {
    fn new_channel(
        &self,
        server: &ServerHandle<DummySock>,
        socket: DummySock,
        peer: Option<SocketAddr>,
        config: &Arc<ServerConfig>,
    ) -> Arc<Channel<DummySock>> {
        self.calls.lock().push(FactoryCall {
            registry: server.registry().clone(),
            peer,
            config: Arc::clone(config),
            opts_at_construction: socket.opts.lock().clone(),
        });
        Channel::new(server, socket, peer)
    }
}

/// A server handle wired to test doubles.
pub struct Harness {
    pub server: ServerHandle<DummySock>,
    pub clock: Arc<ManualClock>,
    pub dispatcher: Arc<RecordingDispatcher>,
}

pub fn harness() -> Harness {
    let clock = Arc::new(ManualClock::default());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let server = ServerHandle::new(
        Registry::new(),
        dispatcher.clone(),
        clock.clone(),
        "localhost",
    );
    Harness {
        server,
        clock,
        dispatcher,
    }
}

/// In-memory log sink for `tracing_subscriber::fmt`.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with WARN and above captured into the returned buffer.
pub fn capture_warnings<R>(f: impl FnOnce() -> R) -> (R, LogBuffer) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .without_time()
        .with_writer(move || writer.clone())
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, buffer)
}
