//! The `N`-worker run loop: drains the work queue, processes one item at a
//! time per key, recovers from panics without killing the worker.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{error, info};

use crate::queue::WorkQueue;

use super::reconcile::{reconcile, ReconcileContext};

/// A running pool of reconciliation workers. Dropping or calling
/// [`Controller::shutdown`] stops dispatch; in-flight `Send`/`Patch` calls
/// are not interrupted, only awaited via `join`.
pub struct Controller {
    queue: Arc<WorkQueue>,
    workers: Vec<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl Controller {
    /// Launches `worker_count` threads, each looping on `queue.get()` until
    /// shutdown. A panic inside one reconciliation is caught, logged, and
    /// the worker moves on to its next item.
    pub fn run(ctx: Arc<ReconcileContext>, queue: Arc<WorkQueue>, worker_count: usize) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let mut workers = Vec::with_capacity(worker_count.max(1));

        for idx in 0..worker_count.max(1) {
            let ctx = ctx.clone();
            let queue = queue.clone();
            let running = running.clone();
            let handle = thread::Builder::new()
                .name(format!("notify-worker-{idx}"))
                .spawn(move || worker_loop(idx, ctx, queue, running))
                .expect("failed to spawn reconciliation worker");
            workers.push(handle);
        }

        Self { queue, workers, running }
    }

    /// Stops dispatching new items and waits for all workers to observe
    /// shutdown and exit.
    pub fn shutdown(self) {
        self.running.store(false, Ordering::SeqCst);
        self.queue.shutdown();
        for handle in self.workers {
            let _ = handle.join();
        }
    }
}

fn worker_loop(idx: usize, ctx: Arc<ReconcileContext>, queue: Arc<WorkQueue>, running: Arc<AtomicBool>) {
    info!(worker = idx, "reconciliation worker started");
    while running.load(Ordering::SeqCst) {
        let Some(key) = queue.get() else {
            break;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| reconcile(&ctx, &key)));
        match outcome {
            Ok(_) => queue.forget(&key),
            Err(payload) => {
                let message = panic_message(&payload);
                error!(worker = idx, key = %key, panic = %message, "reconciliation panicked, continuing");
            }
        }
        queue.done(&key);
    }
    info!(worker = idx, "reconciliation worker stopped");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
