//! Live channel registry.
//!
//! # Responsibilities
//! - Map connection IDs to open channels
//! - Provide the size used for admission control
//! - Hand out snapshots so reaping never iterates a map it mutates
//!
//! A channel is present from the moment it is accepted until it closes;
//! [`Channel::close`](super::Channel::close) removes its own entry.

use std::sync::Arc;

use dashmap::DashMap;

use crate::net::ConnectionId;
use crate::observability::metrics;
use crate::server::channel::Channel;

/// Shared map of open channels.
pub struct Registry<S> {
    channels: Arc<DashMap<ConnectionId, Arc<Channel<S>>>>,
}

impl<S> Clone for Registry<S> {
    fn clone(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
        }
    }
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
        }
    }
}

impl<S> Registry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel.
    ///
    /// Returns `false` if its ID is already registered or the channel has
    /// closed. A channel closing concurrently is either refused here or
    /// removed by its own `close`, never left behind.
    pub fn insert(&self, channel: Arc<Channel<S>>) -> bool {
        let id = channel.id();
        let inserted = match self.channels.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&channel));
                true
            }
        };

        // `close` marks the channel before removing it, so checking after
        // the insert catches a close that ran before the entry existed.
        let inserted = if inserted && channel.is_closed() {
            self.channels.remove(&id);
            false
        } else {
            inserted
        };

        metrics::set_active_channels(self.channels.len());
        inserted
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Channel<S>>> {
        let removed = self.channels.remove(&id).map(|(_, channel)| channel);
        metrics::set_active_channels(self.channels.len());
        removed
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Channel<S>>> {
        self.channels.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.channels.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Point-in-time copy of the open channels.
    pub fn channels(&self) -> Vec<Arc<Channel<S>>> {
        self.channels
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Whether both handles refer to the same map.
    pub fn same_as(&self, other: &Registry<S>) -> bool {
        Arc::ptr_eq(&self.channels, &other.channels)
    }
}

impl<S: crate::net::ConnectionSocket> Registry<S> {
    /// Close every channel. Returns how many were open.
    pub fn close_all(&self) -> usize {
        let channels = self.channels();
        for channel in &channels {
            channel.close();
        }
        channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::testing::{harness, DummySock};

    #[test]
    fn insert_and_remove() {
        let h = harness();
        let server = &h.server;
        let channel = Channel::new(server, DummySock::default(), None);
        let id = channel.id();

        assert!(server.registry().insert(Arc::clone(&channel)));
        assert!(!server.registry().insert(Arc::clone(&channel)));
        assert_eq!(server.registry().len(), 1);
        assert!(server.registry().contains(id));
        assert!(server.registry().get(id).is_some());

        assert!(server.registry().remove(id).is_some());
        assert!(server.registry().is_empty());
        assert!(server.registry().remove(id).is_none());
    }

    #[test]
    fn close_all_empties_registry() {
        let h = harness();
        let server = &h.server;
        for _ in 0..3 {
            let channel = Channel::new(server, DummySock::default(), None);
            server.registry().insert(channel);
        }

        assert_eq!(server.registry().close_all(), 3);
        assert!(server.registry().is_empty());
    }

    #[test]
    fn closed_channel_is_refused() {
        let h = harness();
        let server = &h.server;
        let channel = Channel::new(server, DummySock::default(), None);
        channel.close();

        assert!(!server.registry().insert(channel));
        assert!(server.registry().is_empty());
    }

    #[test]
    fn concurrent_close_never_leaves_entry() {
        let h = harness();
        let server = &h.server;

        for _ in 0..500 {
            let channel = Channel::new(server, DummySock::default(), None);
            let closer = Arc::clone(&channel);
            let worker = std::thread::spawn(move || closer.close());
            server.registry().insert(channel);
            worker.join().unwrap();
        }

        assert!(server.registry().is_empty());
    }

    #[test]
    fn clones_share_state() {
        let registry: Registry<DummySock> = Registry::new();
        let other = registry.clone();
        assert!(registry.same_as(&other));
        assert!(!registry.same_as(&Registry::new()));
    }
}
