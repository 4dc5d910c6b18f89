use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::{PoolError, Result};

/// A type-erased unit of work, executed exactly once by whichever worker
/// pops it.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Creates a connected promise/handle pair.
pub(crate) fn promise<R>() -> (Promise<R>, TaskHandle<R>) {
    let (tx, rx) = channel::bounded(1);
    (Promise { tx }, TaskHandle { rx })
}

/// The producing half of a [`TaskHandle`].
///
/// Dropping a promise without fulfilling it makes the handle report
/// [`PoolError::TaskDropped`].
pub(crate) struct Promise<R> {
    tx: Sender<thread::Result<R>>,
}

impl<R> Promise<R> {
    /// Runs `f`, capturing either its value or its panic payload.
    pub(crate) fn run<F>(self, f: F)
    where
        F: FnOnce() -> R,
    {
        let result = panic::catch_unwind(AssertUnwindSafe(f));
        // The caller may have dropped its handle; nobody is left to tell.
        let _ = self.tx.send(result);
    }
}

/// A handle to the result of a task submitted with
/// [`ThreadPool::spawn_task`](crate::ThreadPool::spawn_task).
///
/// The result is delivered once. After a successful `try_wait` or
/// `wait_timeout` further polling reports [`PoolError::TaskDropped`].
#[derive(Debug)]
pub struct TaskHandle<R> {
    rx: Receiver<thread::Result<R>>,
}

impl<R> TaskHandle<R> {
    /// Blocks until the task has run and returns its value.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TaskPanicked`] if the task panicked, or
    /// [`PoolError::TaskDropped`] if the pool discarded it unexecuted.
    pub fn wait(self) -> Result<R> {
        match self.rx.recv() {
            Ok(result) => unpack(result),
            Err(_) => Err(PoolError::TaskDropped),
        }
    }

    /// Blocks for at most `timeout`. Returns `Ok(None)` if the task has not
    /// finished in time.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<R>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => unpack(result).map(Some),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(PoolError::TaskDropped),
        }
    }

    /// Polls the task without blocking.
    pub fn try_wait(&self) -> Result<Option<R>> {
        match self.rx.try_recv() {
            Ok(result) => unpack(result).map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(PoolError::TaskDropped),
        }
    }
}

fn unpack<R>(result: thread::Result<R>) -> Result<R> {
    result.map_err(|payload| PoolError::TaskPanicked(panic_message(payload.as_ref())))
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
