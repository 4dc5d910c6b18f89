use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_utils::sync::WaitGroup;
use jobpool::{
    BlockingQueue, Job, PoolError, RayonThreadPool, Result, SharedQueueThreadPool, ThreadPool,
    WorkStealingThreadPool,
};

fn spawn_counter<P: ThreadPool>(pool: P) -> Result<()> {
    const TASK_NUM: usize = 20;
    const ADD_COUNT: usize = 1000;

    let wg = WaitGroup::new();
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..TASK_NUM {
        let counter = Arc::clone(&counter);
        let wg = wg.clone();
        pool.spawn(move || {
            for _ in 0..ADD_COUNT {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            drop(wg);
        })
    }

    wg.wait();
    assert_eq!(counter.load(Ordering::SeqCst), TASK_NUM * ADD_COUNT);
    Ok(())
}

fn spawn_panic_task<P: ThreadPool>() -> Result<()> {
    const TASK_NUM: usize = 1000;

    let pool = P::new(4)?;
    for _ in 0..TASK_NUM {
        pool.spawn(move || {
            // It suppresses flood of panic messages to the console.
            panic_control::disable_hook_in_current_thread();
            panic!();
        })
    }

    spawn_counter(pool)
}

fn task_results<P: ThreadPool>() -> Result<()> {
    let pool = P::new(4)?;
    let handles: Vec<_> = (0..100u64).map(|i| pool.spawn_task(move || i * i)).collect();
    let sum: u64 = handles
        .into_iter()
        .map(|h| h.wait())
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .sum();
    assert_eq!(sum, (0..100u64).map(|i| i * i).sum::<u64>());
    Ok(())
}

fn task_panic_surfaces<P: ThreadPool>() -> Result<()> {
    let pool = P::new(2)?;
    let handle = pool.spawn_task(|| -> u32 {
        panic_control::disable_hook_in_current_thread();
        panic!("texture decode failed");
    });
    match handle.wait() {
        Err(PoolError::TaskPanicked(msg)) => assert_eq!(msg, "texture decode failed"),
        other => panic!("unexpected result: {:?}", other),
    }
    // The pool is still usable afterwards.
    assert_eq!(pool.spawn_task(|| 5).wait()?, 5);
    Ok(())
}

#[test]
fn work_stealing_thread_pool_spawn_counter() -> Result<()> {
    let pool = WorkStealingThreadPool::new(4)?;
    spawn_counter(pool)
}

#[test]
fn shared_queue_thread_pool_spawn_counter() -> Result<()> {
    let pool = SharedQueueThreadPool::new(4)?;
    spawn_counter(pool)
}

#[test]
fn rayon_thread_pool_spawn_counter() -> Result<()> {
    let pool = RayonThreadPool::new(4)?;
    spawn_counter(pool)
}

#[test]
fn work_stealing_thread_pool_panic_task() -> Result<()> {
    spawn_panic_task::<WorkStealingThreadPool>()
}

#[test]
fn shared_queue_thread_pool_panic_task() -> Result<()> {
    spawn_panic_task::<SharedQueueThreadPool>()
}

#[test]
fn rayon_thread_pool_panic_task() -> Result<()> {
    spawn_panic_task::<RayonThreadPool>()
}

#[test]
fn work_stealing_thread_pool_task_results() -> Result<()> {
    task_results::<WorkStealingThreadPool>()
}

#[test]
fn shared_queue_thread_pool_task_results() -> Result<()> {
    task_results::<SharedQueueThreadPool>()
}

#[test]
fn rayon_thread_pool_task_results() -> Result<()> {
    task_results::<RayonThreadPool>()
}

#[test]
fn work_stealing_thread_pool_task_panic() -> Result<()> {
    task_panic_surfaces::<WorkStealingThreadPool>()
}

#[test]
fn shared_queue_thread_pool_task_panic() -> Result<()> {
    task_panic_surfaces::<SharedQueueThreadPool>()
}

#[test]
fn rayon_thread_pool_task_panic() -> Result<()> {
    task_panic_surfaces::<RayonThreadPool>()
}

#[test]
fn zero_threads_uses_fallback() -> Result<()> {
    let pool = WorkStealingThreadPool::new(0)?;
    assert!(pool.thread_count() >= 3);
    spawn_counter(pool)
}

#[test]
fn tasks_complete_while_one_worker_is_busy() -> Result<()> {
    let pool = WorkStealingThreadPool::new(4)?;

    // Keep one worker busy; the rest must still drain everything else.
    let blocker = pool.spawn_task(|| thread::sleep(Duration::from_millis(300)));

    let start = Instant::now();
    let handles: Vec<_> = (0..200).map(|i| pool.spawn_task(move || i)).collect();
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.wait()?, i);
    }
    assert!(start.elapsed() < Duration::from_secs(10));

    blocker.wait()?;
    Ok(())
}

#[test]
fn heavy_load_reaches_quiescence() -> Result<()> {
    let pool = WorkStealingThreadPool::new(4)?;
    let counter = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..10_000)
        .map(|_| {
            let counter = Arc::clone(&counter);
            pool.spawn_task(move || counter.fetch_add(1, Ordering::SeqCst))
        })
        .collect();

    let deadline = Duration::from_secs(30);
    for handle in handles {
        assert!(handle.wait_timeout(deadline)?.is_some());
    }
    assert_eq!(counter.load(Ordering::SeqCst), 10_000);
    assert_eq!(pool.pending(), 0);
    Ok(())
}

#[test]
fn shutdown_with_pending_jobs_resolves_every_handle() -> Result<()> {
    let pool = WorkStealingThreadPool::new(2)?;
    let handles: Vec<_> = (0..1000)
        .map(|i| {
            pool.spawn_task(move || {
                thread::sleep(Duration::from_micros(10));
                i
            })
        })
        .collect();
    drop(pool);

    // Workers usually drain their queues after shutdown starts, so most
    // jobs run here; a discarded one must still resolve its handle.
    for (i, handle) in handles.into_iter().enumerate() {
        match handle.wait() {
            Ok(value) => assert_eq!(value, i),
            Err(PoolError::TaskDropped) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[test]
fn shared_queue_drains_on_drop() -> Result<()> {
    let pool = SharedQueueThreadPool::new(2)?;
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..100 {
        let counter = Arc::clone(&counter);
        pool.spawn(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }
    drop(pool);
    assert_eq!(counter.load(Ordering::SeqCst), 100);
    Ok(())
}

/// Hands every job to a `BlockingQueue` instead of running it, the way
/// the work-stealing pool queues jobs before a worker picks them up.
struct QueueOnly(BlockingQueue<Job>);

impl ThreadPool for QueueOnly {
    fn new(_threads: u32) -> Result<Self> {
        Ok(QueueOnly(BlockingQueue::new()))
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.0.push(Box::new(job));
    }
}

#[test]
fn job_discarded_at_shutdown_reports_dropped() -> Result<()> {
    let pool = QueueOnly::new(1)?;
    let handle = pool.spawn_task(|| 1);
    assert!(handle.try_wait()?.is_none());

    // Shut down with the job still queued.
    pool.0.done();
    drop(pool);

    assert!(matches!(handle.wait(), Err(PoolError::TaskDropped)));
    Ok(())
}

#[test]
fn default_thread_pool_matches_hardware_concurrency() -> Result<()> {
    let pool = WorkStealingThreadPool::with_default_threads()?;
    assert_eq!(pool.thread_count(), jobpool::default_thread_count() as usize);
    assert!(pool.thread_count() >= 1);
    spawn_counter(pool)
}
