use std::hint::black_box;
use std::process::exit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use log::{error, info};

use jobpool::{
    default_thread_count, LoaderConfig, PoolError, PoolKind, RayonThreadPool, ResourceLoader,
    Result, SharedQueueThreadPool, SyncToken, ThreadPool, WorkStealingThreadPool,
};

#[derive(Parser)]
#[command(name = "jobpool-bench", version, about = "Drive a job pool with a synthetic workload")]
struct Cli {
    /// Pool backend
    #[arg(long, value_enum, default_value_t = PoolKind::WorkStealing)]
    backend: PoolKind,

    /// Worker threads, defaults to hardware concurrency (0 uses the fallback)
    #[arg(long, value_name = "N")]
    threads: Option<u32>,

    /// Number of tasks to submit
    #[arg(long, default_value_t = 10_000, value_name = "N")]
    tasks: u64,

    /// Spin iterations per task
    #[arg(long, default_value_t = 1_000, value_name = "N")]
    work: u64,

    /// Number of load requests to stream through a resource loader
    #[arg(long, default_value_t = 0, value_name = "N")]
    loads: u64,

    /// Maximum load requests per streamer cycle (0 means unlimited)
    #[arg(long, default_value_t = LoaderConfig::default().batch_size, value_name = "N")]
    batch_size: usize,
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("{}", e);
        exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let threads = cli.threads.unwrap_or_else(default_thread_count);

    info!("jobpool-bench {}", env!("CARGO_PKG_VERSION"));
    info!("Backend: {}", cli.backend);

    match cli.backend {
        PoolKind::WorkStealing => {
            let pool = match cli.threads {
                Some(threads) => WorkStealingThreadPool::new(threads)?,
                None => WorkStealingThreadPool::with_default_threads()?,
            };
            info!("Workers: {}", pool.thread_count());
            run_with_pool(pool, cli.tasks, cli.work)?
        }
        PoolKind::SharedQueue => {
            run_with_pool(SharedQueueThreadPool::new(threads)?, cli.tasks, cli.work)?
        }
        PoolKind::Rayon => run_with_pool(RayonThreadPool::new(threads)?, cli.tasks, cli.work)?,
    }

    if cli.loads > 0 {
        stream_loads(cli.loads, cli.batch_size)?;
    }

    Ok(())
}

/// Submits `tasks` jobs, waits for all of them and checks their results.
fn run_with_pool<P: ThreadPool>(pool: P, tasks: u64, work: u64) -> Result<()> {
    let start = Instant::now();

    let handles: Vec<_> = (0..tasks)
        .map(|i| pool.spawn_task(move || spin(i, work)))
        .collect();

    let mut actual = 0u64;
    for handle in handles {
        actual = actual.wrapping_add(handle.wait()?);
    }

    let expected = expected_checksum(tasks);
    if actual != expected {
        return Err(PoolError::Checksum { expected, actual });
    }

    let elapsed = start.elapsed();
    info!(
        "Ran {} tasks in {:.3}s ({:.0} tasks/s)",
        tasks,
        elapsed.as_secs_f64(),
        tasks as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    Ok(())
}

/// Sum of `0..tasks`, wrapped to `u64` the same way results are summed.
fn expected_checksum(tasks: u64) -> u64 {
    let tasks = u128::from(tasks);
    (tasks * tasks.saturating_sub(1) / 2) as u64
}

/// Burns `work` iterations and returns `i`.
fn spin(i: u64, work: u64) -> u64 {
    let mut acc = i;
    for _ in 0..work {
        acc = black_box(acc.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1));
    }
    black_box(acc);
    i
}

fn stream_loads(loads: u64, batch_size: usize) -> Result<()> {
    let loader = ResourceLoader::new(LoaderConfig { batch_size })?;
    let loaded = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    let mut token: SyncToken = 0;
    for _ in 0..loads {
        let loaded = Arc::clone(&loaded);
        loader.add_request(
            move || {
                loaded.fetch_add(1, Ordering::SeqCst);
            },
            Some(&mut token),
        );
    }
    loader.wait_for_token(token);

    let actual = loaded.load(Ordering::SeqCst);
    if actual != loads {
        return Err(PoolError::Checksum {
            expected: loads,
            actual,
        });
    }

    info!(
        "Streamed {} loads in {:.3}s, last token {}",
        loads,
        start.elapsed().as_secs_f64(),
        loader.last_token_completed()
    );
    Ok(())
}
