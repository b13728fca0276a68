//! Fixed-size worker pools fed by a task queue.
//!
//! One abstraction covers both execution resources the transfer and
//! loading paths need: the shard worker pool (parallel slicing, placement,
//! and read-back) and the dedicated checkpoint-loader queue. Hand-off is
//! FIFO per queue; completion order across workers is not specified.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::future::{FutureValue, Promise};

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A queue of tasks drained by a fixed set of workers.
///
/// Cloning shares the queue. Workers exit once every clone is dropped and
/// the backlog is drained. Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::UnboundedSender<Task>,
}

impl WorkQueue {
    /// Spawn `workers` tasks draining this queue (at least one).
    pub fn new(workers: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));
        for _ in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                loop {
                    // Take the next task while holding the receiver, then
                    // release it so other workers pull while this one runs.
                    let task = { rx.lock().await.recv().await };
                    match task {
                        Some(task) => task.await,
                        None => break,
                    }
                }
            });
        }
        Self { tx }
    }

    /// Fire-and-forget scheduling.
    ///
    /// Returns `false` if the queue has shut down, which can only happen
    /// once every `WorkQueue` clone has been dropped.
    pub fn schedule<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tx.send(Box::pin(task)).is_ok()
    }

    /// Run a closure on the pool, observing completion through a future
    /// cell.
    pub fn submit<T, F>(&self, f: F) -> FutureValue<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (promise, value) = Promise::channel();
        self.schedule(async move { promise.set(f()) });
        value
    }
}
