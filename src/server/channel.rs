//! Per-connection state.
//!
//! # Responsibilities
//! - Own the accepted socket until the connection closes
//! - Track last activity, in-flight tasks and pending close
//! - Remove itself from the registry exactly once on close
//!
//! # Design Decisions
//! - All mutable state sits behind one lock so the reaper reads a
//!   consistent `(last_activity, running_tasks)` pair
//! - A closed channel ignores further state changes
//! - Protocol behaviour lives in tasks created by a [`ChannelFactory`]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::ServerConfig;
use crate::dispatch::{Task, TaskError};
use crate::net::{ConnectionId, ConnectionSocket};
use crate::server::handle::ServerHandle;

#[derive(Debug, Clone, Copy)]
struct ChannelState {
    last_activity: Duration,
    running_tasks: bool,
    will_close: bool,
    closed: bool,
}

/// One accepted client connection.
pub struct Channel<S> {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    server: ServerHandle<S>,
    state: Mutex<ChannelState>,
    socket: Mutex<Option<S>>,
}

impl<S: ConnectionSocket> Channel<S> {
    /// Wrap an accepted socket. The channel is not registered yet.
    pub fn new(server: &ServerHandle<S>, socket: S, peer: Option<SocketAddr>) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::new(),
            peer,
            server: server.clone(),
            state: Mutex::new(ChannelState {
                last_activity: server.now(),
                running_tasks: false,
                will_close: false,
                closed: false,
            }),
            socket: Mutex::new(Some(socket)),
        })
    }
}

impl<S> Channel<S> {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn server(&self) -> &ServerHandle<S> {
        &self.server
    }

    pub fn last_activity(&self) -> Duration {
        self.state.lock().last_activity
    }

    pub fn set_last_activity(&self, at: Duration) {
        let mut state = self.state.lock();
        if !state.closed {
            state.last_activity = at;
        }
    }

    /// Record activity at the current time.
    pub fn touch(&self) {
        self.set_last_activity(self.server.now());
    }

    pub fn running_tasks(&self) -> bool {
        self.state.lock().running_tasks
    }

    pub fn set_running_tasks(&self, running: bool) {
        let mut state = self.state.lock();
        if !state.closed {
            state.running_tasks = running;
        }
    }

    pub fn will_close(&self) -> bool {
        self.state.lock().will_close
    }

    /// Ask for the channel to close once its current task finishes.
    pub fn set_will_close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.will_close = true;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Run `f` against the socket, unless the channel already closed.
    pub fn with_socket<R>(&self, f: impl FnOnce(&S) -> R) -> Option<R> {
        self.socket.lock().as_ref().map(f)
    }
}

impl<S: ConnectionSocket> Channel<S> {
    /// Close the connection and leave the registry. Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.running_tasks = false;
        }

        self.server.registry().remove(self.id);

        if let Some(socket) = self.socket.lock().take() {
            if let Err(e) = socket.shutdown() {
                debug!(connection_id = %self.id, error = %e, "Socket shutdown failed");
            }
        }

        debug!(connection_id = %self.id, peer = ?self.peer, "Channel closed");
    }

    /// Mark for reaping if idle for at least `timeout` with no task running.
    ///
    /// Checked and set under a single lock.
    pub(crate) fn mark_if_idle(&self, now: Duration, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        let idle = !state.closed
            && !state.running_tasks
            && now.saturating_sub(state.last_activity) >= timeout;
        if idle {
            state.will_close = true;
        }
        idle
    }

    /// Hand a task to the dispatcher on behalf of this channel.
    ///
    /// The channel counts as busy until the task finishes or is canceled.
    /// Tasks for a closed channel are canceled immediately.
    pub fn add_task(self: &Arc<Self>, task: Box<dyn Task>) {
        {
            let mut state = self.state.lock();
            if state.closed {
                drop(state);
                task.cancel();
                return;
            }
            state.running_tasks = true;
            state.last_activity = self.server.now();
        }

        self.server.add_task(Box::new(ChannelTask {
            channel: Arc::clone(self),
            inner: task,
        }));
    }

    fn task_finished(&self) {
        let close = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.running_tasks = false;
            state.last_activity = self.server.now();
            state.will_close
        };

        if close {
            self.close();
        }
    }
}

impl<S> std::fmt::Debug for Channel<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &*self.state.lock())
            .finish()
    }
}

/// Task wrapper keeping the channel's busy flag accurate.
struct ChannelTask<S: ConnectionSocket> {
    channel: Arc<Channel<S>>,
    inner: Box<dyn Task>,
}

/// Clears the busy flag even if the task panics.
struct Finished<S: ConnectionSocket>(Arc<Channel<S>>);

impl<S: ConnectionSocket> Drop for Finished<S> {
    fn drop(&mut self) {
        self.0.task_finished();
    }
}

impl<S: ConnectionSocket> Task for ChannelTask<S> {
    fn service(self: Box<Self>) -> Result<(), TaskError> {
        let ChannelTask { channel, inner } = *self;
        let _finished = Finished(channel);
        inner.service()
    }

    fn cancel(self: Box<Self>) {
        let ChannelTask { channel, inner } = *self;
        inner.cancel();
        channel.task_finished();
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Builds channels for accepted connections.
///
/// This is where an application protocol attaches: the factory may queue
/// tasks on the new channel before returning it.
pub trait ChannelFactory<S>: Send {
    fn new_channel(
        &self,
        server: &ServerHandle<S>,
        socket: S,
        peer: Option<SocketAddr>,
        config: &Arc<ServerConfig>,
    ) -> Arc<Channel<S>>;
}

/// Factory producing bare channels with no protocol attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultChannelFactory;

impl<S: ConnectionSocket> ChannelFactory<S> for DefaultChannelFactory {
    fn new_channel(
        &self,
        server: &ServerHandle<S>,
        socket: S,
        peer: Option<SocketAddr>,
        _config: &Arc<ServerConfig>,
    ) -> Arc<Channel<S>> {
        Channel::new(server, socket, peer)
    }
}
