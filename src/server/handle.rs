//! Shared server state handed to channels.

use std::sync::Arc;
use std::time::Duration;

use crate::dispatch::{Dispatcher, Task};
use crate::server::clock::Clock;
use crate::server::registry::Registry;

/// Cheap, cloneable view of the server a channel belongs to.
pub struct ServerHandle<S> {
    registry: Registry<S>,
    dispatcher: Arc<dyn Dispatcher>,
    clock: Arc<dyn Clock>,
    server_name: Arc<str>,
}

impl<S> Clone for ServerHandle<S> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
            clock: Arc::clone(&self.clock),
            server_name: Arc::clone(&self.server_name),
        }
    }
}

impl<S> ServerHandle<S> {
    pub fn new(
        registry: Registry<S>,
        dispatcher: Arc<dyn Dispatcher>,
        clock: Arc<dyn Clock>,
        server_name: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            clock,
            server_name: server_name.into(),
        }
    }

    pub fn registry(&self) -> &Registry<S> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Forward a task to the dispatcher.
    pub fn add_task(&self, task: Box<dyn Task>) {
        self.dispatcher.add_task(task);
    }

    pub(crate) fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }
}
