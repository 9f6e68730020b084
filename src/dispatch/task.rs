//! Units of deferred work.

use std::io;

use thiserror::Error;

/// Errors a task may report from [`Task::service`].
#[derive(Debug, Error)]
pub enum TaskError {
    /// I/O on the connection failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The application reported a failure.
    #[error("Task failed: {0}")]
    Failed(String),
}

/// An opaque unit of work executed by a dispatcher worker.
pub trait Task: Send + 'static {
    /// Run the task. Called at most once, never on the accept loop thread.
    fn service(self: Box<Self>) -> Result<(), TaskError>;

    /// Called instead of `service` when the task is dropped unrun.
    fn cancel(self: Box<Self>) {}

    /// Label used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Task backed by a closure.
pub struct FnTask<F> {
    name: &'static str,
    f: F,
}

impl<F> Task for FnTask<F>
where
    F: FnOnce() -> Result<(), TaskError> + Send + 'static,
{
    fn service(self: Box<Self>) -> Result<(), TaskError> {
        (self.f)()
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Box a closure as a named task.
pub fn from_fn<F>(name: &'static str, f: F) -> Box<dyn Task>
where
    F: FnOnce() -> Result<(), TaskError> + Send + 'static,
{
    Box::new(FnTask { name, f })
}
