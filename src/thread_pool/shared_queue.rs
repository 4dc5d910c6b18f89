use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, error};

use super::{effective_threads, ThreadPool};
use crate::task::{panic_message, Job};
use crate::Result;

/// A thread pool using a single shared job queue.
///
/// Workers pull jobs from one MPMC channel. Unlike
/// [`WorkStealingThreadPool`](super::WorkStealingThreadPool), dropping this
/// pool lets the workers drain every queued job before they exit.
pub struct SharedQueueThreadPool {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool for SharedQueueThreadPool {
    fn new(threads: u32) -> Result<Self> {
        let threads = effective_threads(threads);
        let (tx, rx) = channel::unbounded::<Job>();

        let mut pool = SharedQueueThreadPool {
            tx: Some(tx),
            workers: Vec::with_capacity(threads as usize),
        };
        for id in 0..threads {
            // On error the partially built pool is dropped, which joins
            // the workers that did start.
            pool.workers.push(spawn_worker(id, rx.clone())?);
        }

        debug!("Started shared-queue pool with {threads} workers");
        Ok(pool)
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let sent = match &self.tx {
            Some(tx) => tx.send(Box::new(job)).is_ok(),
            None => false,
        };
        if !sent {
            error!("Shared-queue pool has no active workers, job discarded");
        }
    }
}

/// Spawns a single worker thread that pulls jobs from the receiver until
/// the channel is closed and empty.
fn spawn_worker(id: u32, rx: Receiver<Job>) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name(format!("jobpool-shared-{id}"))
        .spawn(move || {
            for job in rx.iter() {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                    error!(
                        "Worker {id} job panicked, continuing: {}",
                        panic_message(payload.as_ref())
                    );
                }
            }
            debug!("Worker {id}: channel closed, shutting down");
        })?;
    Ok(handle)
}

impl Drop for SharedQueueThreadPool {
    fn drop(&mut self) {
        // Closing the channel makes `rx.iter()` end once it is drained.
        self.tx.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Shared-queue worker terminated abnormally");
            }
        }
    }
}
