use std::fmt;
use std::str::FromStr;

use crate::task::{self, TaskHandle};
use crate::Result;

/// Worker count used when a pool is asked for zero threads.
pub const FALLBACK_THREADS: u32 = 3;

/// A thread pool for executing jobs concurrently.
///
/// Implementors manage a fixed set of worker threads and distribute
/// incoming jobs across them.
pub trait ThreadPool {
    /// Creates a new thread pool with the given number of threads.
    ///
    /// A request for zero threads is corrected to [`FALLBACK_THREADS`].
    ///
    /// # Errors
    ///
    /// Returns an error if the worker threads cannot be started.
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized;

    /// Spawns a function into the thread pool.
    ///
    /// The function will be executed by one of the threads in the pool. A
    /// panic inside it is caught and logged, and the worker keeps running.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static;

    /// Spawns a function and returns a handle to its result.
    ///
    /// A panic inside the function is delivered through the handle as
    /// [`PoolError::TaskPanicked`](crate::PoolError::TaskPanicked).
    fn spawn_task<F, R>(&self, job: F) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (promise, handle) = task::promise();
        self.spawn(move || promise.run(job));
        handle
    }
}

/// Worker count matching the machine's hardware concurrency.
pub fn default_thread_count() -> u32 {
    match num_cpus::get() {
        0 => FALLBACK_THREADS,
        n => n as u32,
    }
}

pub(crate) fn effective_threads(threads: u32) -> u32 {
    if threads == 0 {
        log::debug!("Zero worker threads requested, using {FALLBACK_THREADS}");
        FALLBACK_THREADS
    } else {
        threads
    }
}

/// Selects a pool backend at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PoolKind {
    /// [`WorkStealingThreadPool`]: one queue per worker with stealing.
    #[default]
    WorkStealing,
    /// [`SharedQueueThreadPool`]: all workers share one channel.
    SharedQueue,
    /// [`RayonThreadPool`]: rayon's scheduler.
    Rayon,
}

impl PoolKind {
    /// The name used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::WorkStealing => "work-stealing",
            PoolKind::SharedQueue => "shared-queue",
            PoolKind::Rayon => "rayon",
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolKind {
    type Err = crate::PoolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "work-stealing" => Ok(PoolKind::WorkStealing),
            "shared-queue" => Ok(PoolKind::SharedQueue),
            "rayon" => Ok(PoolKind::Rayon),
            other => Err(crate::PoolError::InvalidPoolKind(other.to_owned())),
        }
    }
}

mod rayon_pool;
mod shared_queue;
mod work_stealing;

pub use self::rayon_pool::RayonThreadPool;
pub use self::shared_queue::SharedQueueThreadPool;
pub use self::work_stealing::WorkStealingThreadPool;
