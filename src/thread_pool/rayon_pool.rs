use std::panic::{self, AssertUnwindSafe};

use log::error;

use super::{effective_threads, ThreadPool};
use crate::task::panic_message;
use crate::{PoolError, Result};

/// A thread pool backed by the `rayon` library.
///
/// Uses rayon's own work-stealing scheduler. Kept as a reference point
/// for [`WorkStealingThreadPool`](super::WorkStealingThreadPool).
pub struct RayonThreadPool {
    pool: rayon::ThreadPool,
}

impl ThreadPool for RayonThreadPool {
    fn new(threads: u32) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(effective_threads(threads) as usize)
            .thread_name(|index| format!("jobpool-rayon-{index}"))
            .build()
            .map_err(|e| PoolError::Backend(e.to_string()))?;
        Ok(RayonThreadPool { pool })
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // rayon aborts on an unhandled panic in a spawned job
        self.pool.spawn(move || {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                error!("Rayon job panicked: {}", panic_message(payload.as_ref()));
            }
        });
    }
}
