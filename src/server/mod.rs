//! Connection acceptance subsystem.
//!
//! # Data Flow
//! ```text
//! EventLoop (event_loop.rs)
//!     → Acceptor::readable (cleanup deadline, admission check)
//!     → Acceptor::handle_accept
//!         → socket options applied
//!         → ChannelFactory::new_channel (channel.rs)
//!         → Registry::insert (registry.rs)
//! Channel::add_task → Dispatcher (crate::dispatch)
//! Cleanup: reaper::maintenance closes idle channels
//! ```
//!
//! # Design Decisions
//! - One accept loop thread; protocol work happens on dispatcher workers
//! - Registry size is the only admission input
//! - Time comes from an injectable [`Clock`] so reaping is testable

pub mod acceptor;
pub mod channel;
pub mod clock;
pub mod error;
#[cfg(unix)]
pub mod event_loop;
pub mod handle;
pub mod reaper;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use acceptor::{Acceptor, EventHooks};
pub use channel::{Channel, ChannelFactory, DefaultChannelFactory};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::ServerError;
#[cfg(unix)]
pub use event_loop::EventLoop;
pub use handle::ServerHandle;
pub use registry::Registry;
