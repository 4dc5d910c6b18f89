//! Asynchronous resource streaming with token-based completion.
//!
//! A [`ResourceLoader`] owns one streamer thread. Any thread may queue a
//! load request; each request is stamped with the next [`SyncToken`].
//! The streamer executes requests in batches, in submission order, and
//! after each batch publishes the highest token it finished. A resource is
//! safe to use once its token is completed.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, error};

use crate::task::{panic_message, Job};
use crate::Result;

/// Identifies a queued load. Tokens increase monotonically; `0` is
/// completed from the start.
pub type SyncToken = u64;

const DEFAULT_BATCH_SIZE: usize = 64;

/// Streamer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Maximum number of requests handled per streamer cycle. `0` takes
    /// everything queued.
    pub batch_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

struct Request {
    job: Job,
    wait_index: SyncToken,
}

struct QueueState {
    requests: VecDeque<Request>,
    running: bool,
}

struct Shared {
    queue: Mutex<QueueState>,
    queue_cond: Condvar,
    /// Last token handed out. Only advanced under `queue`.
    token_counter: AtomicU64,
    /// Last token finished. Only advanced under `token_lock`.
    token_completed: AtomicU64,
    token_lock: Mutex<()>,
    token_cond: Condvar,
    batch_size: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Streams load requests on a dedicated thread.
///
/// Dropping the loader finishes every request already queued, then joins
/// the streamer.
pub struct ResourceLoader {
    shared: Arc<Shared>,
    streamer: Option<JoinHandle<()>>,
}

impl ResourceLoader {
    /// Starts a loader and its streamer thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the streamer thread cannot be spawned.
    pub fn new(config: LoaderConfig) -> Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(QueueState {
                requests: VecDeque::new(),
                running: true,
            }),
            queue_cond: Condvar::new(),
            token_counter: AtomicU64::new(0),
            token_completed: AtomicU64::new(0),
            token_lock: Mutex::new(()),
            token_cond: Condvar::new(),
            batch_size: config.batch_size,
        });

        let streamer = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("jobpool-streamer".to_owned())
                .spawn(move || run_streamer(&shared))?
        };

        Ok(ResourceLoader {
            shared,
            streamer: Some(streamer),
        })
    }

    /// Queues a load request and returns its token.
    ///
    /// If `token` is given it is raised to the new token, so one variable
    /// can accumulate the latest of several requests.
    pub fn add_request<F>(&self, job: F, token: Option<&mut SyncToken>) -> SyncToken
    where
        F: FnOnce() + Send + 'static,
    {
        let t = {
            let mut state = lock(&self.shared.queue);
            let t = self.shared.token_counter.load(Ordering::SeqCst) + 1;
            self.shared.token_counter.store(t, Ordering::SeqCst);
            state.requests.push_back(Request {
                job: Box::new(job),
                wait_index: t,
            });
            t
        };
        self.shared.queue_cond.notify_one();

        if let Some(token) = token {
            *token = (*token).max(t);
        }
        t
    }

    /// Highest token for which [`is_token_completed`](Self::is_token_completed)
    /// is guaranteed to be true.
    pub fn last_token_completed(&self) -> SyncToken {
        self.shared.token_completed.load(Ordering::SeqCst)
    }

    /// Whether the request stamped with `token`, and every earlier one,
    /// has finished.
    pub fn is_token_completed(&self, token: SyncToken) -> bool {
        token <= self.last_token_completed()
    }

    /// Blocks until `token` is completed.
    pub fn wait_for_token(&self, token: SyncToken) {
        let mut guard = lock(&self.shared.token_lock);
        while !self.is_token_completed(token) {
            guard = self
                .shared
                .token_cond
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Whether every request queued so far has finished.
    pub fn all_loads_completed(&self) -> bool {
        self.is_token_completed(self.shared.token_counter.load(Ordering::SeqCst))
    }

    /// Blocks until every request queued before this call has finished.
    ///
    /// Requests queued by other threads while waiting are not covered.
    pub fn wait_for_all_loads(&self) {
        let token = self.shared.token_counter.load(Ordering::SeqCst);
        self.wait_for_token(token);
    }
}

impl Drop for ResourceLoader {
    fn drop(&mut self) {
        lock(&self.shared.queue).running = false;
        self.shared.queue_cond.notify_one();
        if let Some(streamer) = self.streamer.take() {
            if streamer.join().is_err() {
                error!("Resource streamer terminated abnormally");
            }
        }
    }
}

fn run_streamer(shared: &Shared) {
    debug!("Resource streamer started");

    loop {
        let batch: Vec<Request> = {
            let mut state = lock(&shared.queue);
            while state.requests.is_empty() && state.running {
                state = shared
                    .queue_cond
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if state.requests.is_empty() {
                break;
            }
            let take = match shared.batch_size {
                0 => state.requests.len(),
                n => n.min(state.requests.len()),
            };
            state.requests.drain(..take).collect()
        };

        let mut max_token = 0;
        for request in batch {
            debug_assert!(max_token < request.wait_index);
            max_token = request.wait_index;
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(request.job)) {
                error!(
                    "Load request {} panicked: {}",
                    request.wait_index,
                    panic_message(payload.as_ref())
                );
            }
        }

        {
            let _guard = lock(&shared.token_lock);
            shared.token_completed.fetch_max(max_token, Ordering::SeqCst);
        }
        shared.token_cond.notify_all();
    }

    debug!("Resource streamer shutting down");
}
