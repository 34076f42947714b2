//! Off-thread dispatch for [`TransactionListener`]s declared asynchronous.
//!
//! Synchronous listeners run inline with the triggering phase, on the
//! caller's thread, so their return value can affect the transaction.
//! Asynchronous listeners are never required for correctness (spec.md
//! §4.8), so the container hands their callbacks to one dedicated
//! background thread instead, keeping commit latency independent of how
//! slow those listeners are. Grounded on the teacher's
//! `BackgroundScheduler` (`strata-engine::background`), generalized from its
//! priority task queue to a plain bounded FIFO channel, since listener
//! dispatch has no priority tiers to schedule between.

use std::sync::mpsc::{sync_channel, SyncSender};
use std::thread::JoinHandle;

use tracing::error;

const QUEUE_CAPACITY: usize = 1024;

/// A single background worker draining a bounded queue of listener
/// callbacks.
pub struct AsyncListenerDispatcher {
    sender: Option<SyncSender<Box<dyn FnOnce() + Send>>>,
    worker: Option<JoinHandle<()>>,
}

impl AsyncListenerDispatcher {
    /// Spawn the background worker thread.
    pub fn new() -> Self {
        let (sender, receiver) = sync_channel::<Box<dyn FnOnce() + Send>>(QUEUE_CAPACITY);
        let worker = std::thread::Builder::new()
            .name("jacis-async-listener".to_string())
            .spawn(move || {
                for task in receiver {
                    task();
                }
            })
            .expect("failed to spawn async listener dispatch thread");
        AsyncListenerDispatcher {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    /// Enqueue `task` to run on the background thread. Callbacks run in
    /// the order they were enqueued, but asynchronous listeners make no
    /// ordering promise relative to other transactions' callbacks (spec.md
    /// §4.8: asynchronous listeners are never required for correctness).
    /// Logged and dropped if the queue is full rather than blocking the
    /// caller indefinitely.
    pub fn dispatch(&self, task: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            if sender.try_send(Box::new(task)).is_err() {
                error!("async transaction-listener queue full; dropping callback");
            }
        }
    }
}

impl Default for AsyncListenerDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AsyncListenerDispatcher {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn dispatched_tasks_eventually_run() {
        let dispatcher = AsyncListenerDispatcher::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            dispatcher.dispatch(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        drop(dispatcher); // joins the worker, draining the queue first
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }
}
