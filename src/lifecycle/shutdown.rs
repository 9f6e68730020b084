//! Shutdown coordination for the server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mio::Waker;
use parking_lot::Mutex;

/// Coordinator for graceful shutdown.
///
/// The blocking event loop polls [`Shutdown::is_triggered`] and registers a
/// [`Waker`] so a trigger interrupts its poll immediately.
pub struct Shutdown {
    triggered: AtomicBool,
    wakers: Mutex<Vec<Arc<Waker>>>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            triggered: AtomicBool::new(false),
            wakers: Mutex::new(Vec::new()),
        }
    }

    /// Register a poll waker to be woken on trigger.
    pub fn register_waker(&self, waker: Arc<Waker>) {
        let mut wakers = self.wakers.lock();
        if self.is_triggered() {
            let _ = waker.wake();
        }
        wakers.push(waker);
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return;
        }

        for waker in self.wakers.lock().iter() {
            if let Err(e) = waker.wake() {
                tracing::warn!(error = %e, "Failed to wake event loop");
            }
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::{Events, Poll, Token};
    use std::time::Duration;

    #[test]
    fn trigger_is_sticky() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());
        shutdown.trigger();
        shutdown.trigger();
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn trigger_wakes_registered_poll() {
        let mut poll = Poll::new().unwrap();
        let waker = Arc::new(Waker::new(poll.registry(), Token(7)).unwrap());
        let shutdown = Shutdown::new();
        shutdown.register_waker(waker);

        shutdown.trigger();

        let mut events = Events::with_capacity(4);
        poll.poll(&mut events, Some(Duration::from_secs(5))).unwrap();
        assert!(events.iter().any(|event| event.token() == Token(7)));
    }

    #[test]
    fn late_registration_wakes_immediately() {
        let mut poll = Poll::new().unwrap();
        let waker = Arc::new(Waker::new(poll.registry(), Token(3)).unwrap());
        let shutdown = Shutdown::new();
        shutdown.trigger();

        shutdown.register_waker(waker);

        let mut events = Events::with_capacity(4);
        poll.poll(&mut events, Some(Duration::from_secs(5))).unwrap();
        assert!(events.iter().any(|event| event.token() == Token(3)));
    }
}
