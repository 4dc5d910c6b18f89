use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, TryLockError};

/// An unbounded FIFO queue guarded by a mutex, with blocking pop.
///
/// Producers `push` from any thread. Consumers either `pop`, which waits
/// until an item arrives or the queue is marked [`done`](Self::done), or
/// `try_pop`, which gives up immediately if the lock is contended. The
/// latter is what pool workers use to steal from each other.
#[derive(Debug)]
pub struct BlockingQueue<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    done: bool,
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BlockingQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        BlockingQueue {
            state: Mutex::new(State {
                items: VecDeque::new(),
                done: false,
            }),
            ready: Condvar::new(),
        }
    }

    // No user code runs under the lock, so a poisoned state is still intact.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_lock(&self) -> Option<MutexGuard<'_, State<T>>> {
        match self.state.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Appends an item and wakes one blocked consumer.
    pub fn push(&self, item: T) {
        self.lock().items.push_back(item);
        self.ready.notify_one();
    }

    /// Appends an item only if the lock is free right now.
    ///
    /// # Errors
    ///
    /// Hands the item back if another thread holds the lock.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        match self.try_lock() {
            Some(mut state) => state.items.push_back(item),
            None => return Err(item),
        }
        self.ready.notify_one();
        Ok(())
    }

    /// Removes the front item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is both empty and done.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        while state.items.is_empty() && !state.done {
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.items.pop_front()
    }

    /// Removes the front item without blocking.
    ///
    /// Returns `None` if the queue is empty or its lock is contended.
    pub fn try_pop(&self) -> Option<T> {
        self.try_lock()?.items.pop_front()
    }

    /// Marks the queue as finished and wakes every blocked consumer.
    ///
    /// Items already queued can still be popped. Calling this twice is a
    /// no-op.
    pub fn done(&self) {
        self.lock().done = true;
        self.ready.notify_all();
    }

    /// Whether [`done`](Self::done) has been called.
    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    /// Number of queued items. Advisory only.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Whether the queue is empty. Advisory only.
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}
