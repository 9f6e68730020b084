//! Task dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Channel produces a Task
//!     → Acceptor::add_task / Channel::add_task
//!     → Dispatcher::add_task (enqueue, returns immediately)
//!     → pool.rs worker thread runs Task::service
//!     → errors and panics are logged, the worker moves on
//! ```
//!
//! # Design Decisions
//! - The accept loop never executes a task inline
//! - FIFO ordering, no priorities; each task runs at most once
//! - Shutdown either drains or cancels the queue

pub mod pool;
pub mod task;

use std::time::Duration;

pub use pool::ThreadedDispatcher;
pub use task::{from_fn, Task, TaskError};

/// Queue plus worker pool executing tasks off the accept loop.
pub trait Dispatcher: Send + Sync {
    /// Enqueue a task for asynchronous execution.
    fn add_task(&self, task: Box<dyn Task>);

    /// Stop all workers, draining or canceling queued tasks.
    ///
    /// Returns `false` if workers were still running when `timeout` elapsed.
    fn shutdown(&self, cancel_pending: bool, timeout: Duration) -> bool;
}
