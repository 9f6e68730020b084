//! Readiness loop driving the acceptor.
//!
//! # Data Flow
//! ```text
//! loop:
//!     hooks.readable() / hooks.writable()   (cleanup runs here)
//!     → (re)register or deregister the listener with mio
//!     → poll with timeout
//!     → readable event → hooks.handle_accept()
//!     → waker event → check shutdown
//! ```
//!
//! mio is edge-triggered. Re-registering on every pass re-arms the listener,
//! which gives the level-triggered behaviour admission control relies on:
//! a connection left in the backlog at the limit is reported again once
//! interest returns.

use std::io;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, info};

use crate::lifecycle::Shutdown;
use crate::server::acceptor::EventHooks;

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);

const EVENTS_CAPACITY: usize = 64;

pub struct EventLoop {
    poll: Poll,
    events: Events,
    waker: Arc<Waker>,
    poll_timeout: Duration,
}

impl EventLoop {
    pub fn new(poll_timeout: Duration) -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
        Ok(Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            waker,
            poll_timeout,
        })
    }

    /// Waker that interrupts a blocked poll.
    pub fn waker(&self) -> Arc<Waker> {
        Arc::clone(&self.waker)
    }

    /// Run until `shutdown` triggers.
    pub fn run<H>(&mut self, hooks: &mut H, shutdown: &Shutdown) -> io::Result<()>
    where
        H: EventHooks + AsRawFd,
    {
        shutdown.register_waker(self.waker());

        let fd = hooks.as_raw_fd();
        let mut registered = false;
        info!(poll_timeout_ms = self.poll_timeout.as_millis() as u64, "Event loop started");

        while !shutdown.is_triggered() {
            let interest = interest(hooks.readable(), hooks.writable());

            let mut source = SourceFd(&fd);
            match (interest, registered) {
                (Some(interest), false) => {
                    self.poll.registry().register(&mut source, LISTENER, interest)?;
                    registered = true;
                }
                (Some(interest), true) => {
                    self.poll.registry().reregister(&mut source, LISTENER, interest)?;
                }
                (None, true) => {
                    self.poll.registry().deregister(&mut source)?;
                    registered = false;
                    debug!("Listener paused");
                }
                (None, false) => {}
            }

            match self.poll.poll(&mut self.events, Some(self.poll_timeout)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            for event in self.events.iter() {
                if event.token() == LISTENER && (event.is_readable() || event.is_error()) {
                    hooks.handle_accept();
                }
            }
        }

        if registered {
            self.poll.registry().deregister(&mut SourceFd(&fd))?;
        }
        info!("Event loop stopped");
        Ok(())
    }
}

fn interest(readable: bool, writable: bool) -> Option<Interest> {
    match (readable, writable) {
        (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
        (true, false) => Some(Interest::READABLE),
        (false, true) => Some(Interest::WRITABLE),
        (false, false) => None,
    }
}
