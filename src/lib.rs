#![deny(missing_docs)]

//! A job system for game engines.
//!
//! This library provides a blocking work queue, a fixed-size
//! work-stealing thread pool with fire-and-forget and future-returning
//! submission, and a resource loader that streams load requests on a
//! dedicated thread and reports completion through sync tokens.

/// Mutex and condvar guarded FIFO queue.
pub mod blocking_queue;
mod error;
pub mod resource_loader;
mod task;
/// Thread pool implementations for concurrent job execution.
pub mod thread_pool;

pub use blocking_queue::BlockingQueue;
pub use error::{PoolError, Result};
pub use resource_loader::{LoaderConfig, ResourceLoader, SyncToken};
pub use task::{Job, TaskHandle};
pub use thread_pool::{
    default_thread_count, PoolKind, RayonThreadPool, SharedQueueThreadPool, ThreadPool,
    WorkStealingThreadPool, FALLBACK_THREADS,
};
