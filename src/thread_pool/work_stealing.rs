use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error};

use super::{default_thread_count, effective_threads, ThreadPool};
use crate::blocking_queue::BlockingQueue;
use crate::task::{panic_message, Job};
use crate::Result;

/// A thread pool with one queue per worker and work stealing.
///
/// Each worker scans every queue with `try_pop`, starting at its own, and
/// only blocks on its own queue once the scan comes up empty. Submissions
/// are spread round-robin. No lock is held while a job runs.
///
/// Dropping the pool marks every queue done and joins the workers. Jobs
/// still queued at that point may never run.
pub struct WorkStealingThreadPool {
    queues: Arc<[BlockingQueue<Job>]>,
    workers: Vec<JoinHandle<()>>,
    next: AtomicUsize,
}

impl WorkStealingThreadPool {
    /// Creates a pool sized to the machine's hardware concurrency.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be spawned.
    pub fn with_default_threads() -> Result<Self> {
        Self::new(default_thread_count())
    }

    /// Number of worker threads.
    pub fn thread_count(&self) -> usize {
        self.queues.len()
    }

    /// Jobs waiting across all queues. Advisory only.
    pub fn pending(&self) -> usize {
        self.queues.iter().map(BlockingQueue::len).sum()
    }

    fn shutdown(&mut self) {
        for queue in self.queues.iter() {
            queue.done();
        }
        for worker in self.workers.drain(..) {
            let name = worker.thread().name().unwrap_or("<unnamed>").to_owned();
            if worker.join().is_err() {
                error!("Worker {name} terminated abnormally");
            }
        }
    }
}

impl ThreadPool for WorkStealingThreadPool {
    fn new(threads: u32) -> Result<Self> {
        let threads = effective_threads(threads) as usize;
        let queues: Arc<[BlockingQueue<Job>]> =
            (0..threads).map(|_| BlockingQueue::new()).collect();

        let mut pool = WorkStealingThreadPool {
            queues,
            workers: Vec::with_capacity(threads),
            next: AtomicUsize::new(0),
        };

        for index in 0..threads {
            let queues = Arc::clone(&pool.queues);
            let spawned = thread::Builder::new()
                .name(format!("jobpool-worker-{index}"))
                .spawn(move || run_worker(index, queues));
            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(e) => {
                    error!("Failed to spawn worker {index}: {e}");
                    pool.shutdown();
                    return Err(e.into());
                }
            }
        }

        debug!("Started work-stealing pool with {threads} workers");
        Ok(pool)
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let count = self.queues.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed);

        // Prefer any uncontended queue over waiting on the chosen one.
        let mut job: Job = Box::new(job);
        for n in 0..count {
            match self.queues[(start + n) % count].try_push(job) {
                Ok(()) => return,
                Err(rejected) => job = rejected,
            }
        }
        self.queues[start % count].push(job);
    }
}

impl Drop for WorkStealingThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(index: usize, queues: Arc<[BlockingQueue<Job>]>) {
    debug!("Worker {index} started");
    let count = queues.len();

    loop {
        let job = (0..count)
            .find_map(|n| queues[(index + n) % count].try_pop())
            .or_else(|| queues[index].pop());

        let Some(job) = job else {
            break;
        };

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            error!(
                "Worker {index} job panicked, continuing: {}",
                panic_message(payload.as_ref())
            );
        }
    }

    debug!("Worker {index}: queue closed, shutting down");
}
