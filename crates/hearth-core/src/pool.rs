//! Fixed-size worker pool.
//!
//! A FIFO queue of boxed tasks behind a mutex and condition variable.
//! Workers run one task at a time; a stop request is cooperative, so a
//! task already executing runs to completion and queued tasks drain
//! before the workers exit. Panics inside a task are caught, logged,
//! and never take a worker down.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::log_debug;
use crate::log_error;
use crate::log_info;
use crate::logging::LogContext;

type Task = Box<dyn FnOnce() + Send + 'static>;

struct QueueState {
    tasks: VecDeque<Task>,
    stopped: bool,
}

struct Shared {
    queue: Mutex<QueueState>,
    available: Condvar,
    pending: AtomicUsize,
    idle: Mutex<()>,
    all_done: Condvar,
}

/// Fixed pool of worker threads consuming a shared FIFO task queue.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers. A size of zero is clamped to one.
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                stopped: false,
            }),
            available: Condvar::new(),
            pending: AtomicUsize::new(0),
            idle: Mutex::new(()),
            all_done: Condvar::new(),
        });

        let workers = (0..size)
            .map(|worker_id| {
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("hearth-worker-{worker_id}"))
                    .spawn(move || worker_loop(&shared, worker_id))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { shared, workers }
    }

    /// Number of worker threads.
    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a task and wake one worker.
    ///
    /// Tasks enqueued after [`stop`][Self::stop] are dropped.
    pub fn enqueue<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut queue = self.shared.queue.lock();
        if queue.stopped {
            return;
        }
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        queue.tasks.push_back(Box::new(task));
        drop(queue);
        self.shared.available.notify_one();
    }

    /// Block until every enqueued task has finished.
    pub fn wait_for_all(&self) {
        let mut idle = self.shared.idle.lock();
        while self.shared.pending.load(Ordering::SeqCst) != 0 {
            self.shared.all_done.wait(&mut idle);
        }
    }

    /// Request a cooperative stop: workers drain the queue, then exit.
    pub fn stop(&self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.stopped = true;
        }
        self.shared.available.notify_all();
        log_info!(LogContext::server(), "worker pool stop requested");
    }

    /// Number of tasks enqueued but not yet completed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(shared: &Shared, worker_id: usize) {
    loop {
        let task = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(task) = queue.tasks.pop_front() {
                    break task;
                }
                if queue.stopped {
                    log_info!(
                        LogContext::server(),
                        format!("worker-{worker_id} exiting")
                    );
                    return;
                }
                shared.available.wait(&mut queue);
            }
        };

        let start = std::time::Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(task));
        if let Err(payload) = outcome {
            let detail = panic_message(&payload);
            log_error!(
                LogContext::server(),
                format!("worker-{worker_id} task panicked: {detail}")
            );
        } else {
            log_debug!(
                LogContext::server(),
                format!("worker-{worker_id} task completed"),
                duration_ms => start.elapsed().as_millis()
            );
        }

        if shared.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _idle = shared.idle.lock();
            shared.all_done.notify_all();
        }
    }
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
