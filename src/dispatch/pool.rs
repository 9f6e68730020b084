//! Threaded task dispatcher.
//!
//! # Responsibilities
//! - Queue tasks FIFO and run them on a fixed set of worker threads
//! - Contain task failures (errors and panics) inside the worker
//! - Resize the pool at runtime
//! - Drain or cancel the queue on shutdown
//!
//! # Design Decisions
//! - Workers stop on an explicit `Stop` message so shrinking never
//!   interrupts a running task
//! - Pool size is independent from the connection limit

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::dispatch::task::Task;
use crate::dispatch::Dispatcher;
use crate::observability::metrics;

enum Message {
    Run(Box<dyn Task>),
    Stop,
}

/// Dispatcher running tasks on a pool of OS threads.
pub struct ThreadedDispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    tx: Sender<Message>,
    rx: Receiver<Message>,
    done_tx: Sender<usize>,
    done_rx: Receiver<usize>,
    pending: AtomicUsize,
    state: Mutex<PoolState>,
}

#[derive(Default)]
struct PoolState {
    next_id: usize,
    /// Workers that have not been asked to stop.
    running: usize,
    workers: HashMap<usize, JoinHandle<()>>,
    stopped: bool,
}

impl ThreadedDispatcher {
    /// Create a dispatcher with `threads` workers.
    pub fn new(threads: usize) -> Self {
        let (tx, rx) = channel::unbounded();
        let (done_tx, done_rx) = channel::unbounded();
        let dispatcher = Self {
            inner: Arc::new(Inner {
                tx,
                rx,
                done_tx,
                done_rx,
                pending: AtomicUsize::new(0),
                state: Mutex::new(PoolState::default()),
            }),
        };
        dispatcher.set_thread_count(threads);
        dispatcher
    }

    /// Grow or shrink the pool to `count` workers.
    ///
    /// Shrinking lets each retiring worker finish the task it is running.
    pub fn set_thread_count(&self, count: usize) {
        let mut state = self.inner.state.lock();
        if state.stopped {
            return;
        }
        self.reap_exited(&mut state);

        while state.running < count {
            let id = state.next_id;
            let inner = Arc::clone(&self.inner);
            let spawned = thread::Builder::new()
                .name(format!("gatehouse-worker-{id}"))
                .spawn(move || worker_loop(id, inner));

            match spawned {
                Ok(handle) => {
                    state.next_id += 1;
                    state.running += 1;
                    state.workers.insert(id, handle);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to spawn dispatcher worker");
                    break;
                }
            }
        }

        while state.running > count {
            let _ = self.inner.tx.send(Message::Stop);
            state.running -= 1;
        }

        tracing::debug!(threads = state.running, "Dispatcher resized");
    }

    /// Number of workers not asked to stop.
    pub fn thread_count(&self) -> usize {
        self.inner.state.lock().running
    }

    /// Number of queued tasks not yet claimed by a worker.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    fn reap_exited(&self, state: &mut PoolState) {
        while let Ok(id) = self.inner.done_rx.try_recv() {
            if let Some(handle) = state.workers.remove(&id) {
                let _ = handle.join();
            }
        }
    }
}

impl Dispatcher for ThreadedDispatcher {
    fn add_task(&self, task: Box<dyn Task>) {
        // Held across the send so a concurrent shutdown cannot strand the task.
        let state = self.inner.state.lock();
        if state.stopped {
            drop(state);
            tracing::warn!(task = task.name(), "Dispatcher stopped, canceling task");
            task.cancel();
            return;
        }

        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        if let Err(channel::SendError(message)) = self.inner.tx.send(Message::Run(task)) {
            self.inner.pending.fetch_sub(1, Ordering::SeqCst);
            if let Message::Run(task) = message {
                task.cancel();
            }
        }
        drop(state);
        metrics::set_pending_tasks(self.pending());
    }

    fn shutdown(&self, cancel_pending: bool, timeout: Duration) -> bool {
        let mut state = self.inner.state.lock();
        if state.stopped && state.workers.is_empty() {
            return true;
        }
        state.stopped = true;

        // Stop messages already queued by a shrink must survive the drain.
        let mut stops = state.running;
        if cancel_pending {
            let mut canceled = 0usize;
            while let Ok(message) = self.inner.rx.try_recv() {
                match message {
                    Message::Run(task) => {
                        self.inner.pending.fetch_sub(1, Ordering::SeqCst);
                        task.cancel();
                        canceled += 1;
                    }
                    Message::Stop => stops += 1,
                }
            }
            if canceled > 0 {
                tracing::warn!(canceled, "Canceling pending task(s)");
            }
        }
        for _ in 0..stops {
            let _ = self.inner.tx.send(Message::Stop);
        }
        state.running = 0;
        let mut remaining = std::mem::take(&mut state.workers);
        drop(state);

        let deadline = Instant::now() + timeout;
        while !remaining.is_empty() {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.inner.done_rx.recv_timeout(left) {
                Ok(id) => {
                    if let Some(handle) = remaining.remove(&id) {
                        let _ = handle.join();
                    }
                }
                Err(_) => break,
            }
        }
        metrics::set_pending_tasks(self.pending());

        if remaining.is_empty() {
            tracing::info!("Dispatcher stopped");
            true
        } else {
            tracing::warn!(workers = remaining.len(), "Workers still busy after shutdown timeout");
            false
        }
    }
}

impl Drop for ThreadedDispatcher {
    fn drop(&mut self) {
        let state = self.inner.state.lock();
        if !state.stopped {
            for _ in 0..state.running {
                let _ = self.inner.tx.send(Message::Stop);
            }
        }
    }
}

fn worker_loop(id: usize, inner: Arc<Inner>) {
    while let Ok(message) = inner.rx.recv() {
        match message {
            Message::Stop => break,
            Message::Run(task) => {
                inner.pending.fetch_sub(1, Ordering::SeqCst);
                run_task(task);
            }
        }
    }
    tracing::trace!(worker = id, "Dispatcher worker exiting");
    let _ = inner.done_tx.send(id);
}

fn run_task(task: Box<dyn Task>) {
    let name = task.name();
    match panic::catch_unwind(AssertUnwindSafe(move || task.service())) {
        Ok(Ok(())) => metrics::record_task("ok"),
        Ok(Err(e)) => {
            tracing::error!(task = name, error = %e, "Exception when servicing task");
            metrics::record_task("error");
        }
        Err(payload) => {
            tracing::error!(task = name, panic = %panic_message(payload.as_ref()), "Task panicked");
            metrics::record_task("panic");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
