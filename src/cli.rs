//! Command-line interface for taskmill.
//!
//! Drives a demo workload through the pool: submit N synthetic image
//! jobs, close submission, and drain the result stream while logging
//! each arrival and a final summary.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{info, warn};

use crate::job::{JobError, JobStatus};
use crate::worker_pool::{PoolConfig, WorkerPool};

/// Fan synthetic image-processing jobs across a pool of workers.
#[derive(Parser, Debug)]
#[command(name = "taskmill")]
#[command(about = "Run a demo workload through the taskmill worker pool")]
#[command(version)]
#[command(
    long_about = "taskmill submits N synthetic image jobs to a fixed pool of W workers and\n\
                  drains the fan-in result stream to completion.\n\n\
                  With a fixed per-job delay, wall-clock time lands near ceil(N/W) * delay,\n\
                  demonstrating true parallel execution.\n\n\
                  Example usage:\n  taskmill --workers 5 --jobs 20 --delay-ms 50"
)]
pub struct Cli {
    /// Number of worker tasks.
    #[arg(short, long, default_value = "5")]
    pub workers: usize,

    /// Number of jobs to submit.
    #[arg(short, long, default_value = "20")]
    pub jobs: usize,

    /// Simulated processing delay per job, in milliseconds.
    #[arg(short, long, default_value = "50")]
    pub delay_ms: u64,

    /// Job queue capacity. Values below --jobs exercise backpressure.
    #[arg(long, default_value = "64")]
    pub queue_capacity: usize,

    /// Fail every Nth job to demonstrate failure isolation (0 disables).
    #[arg(long, default_value = "0")]
    pub fail_every: usize,

    /// Cancel the pool after this many results (0 disables).
    #[arg(long, default_value = "0")]
    pub cancel_after: usize,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    pub log_level: String,
}

/// Parses CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Runs the demo workload with parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = PoolConfig::new(cli.workers)
        .with_queue_capacity(cli.queue_capacity)
        .with_result_capacity(cli.queue_capacity);

    let delay = Duration::from_millis(cli.delay_ms);
    let fail_every = cli.fail_every;

    let pool = WorkerPool::start_fn(config, move |name: String| async move {
        tokio::time::sleep(delay).await;
        let index: usize = name
            .trim_start_matches("image-")
            .trim_end_matches(".png")
            .parse()
            .unwrap_or(0);
        if fail_every > 0 && index % fail_every == 0 {
            return Err(JobError::new(format!("simulated failure for {name}")));
        }
        Ok(name)
    })?;

    let pool = Arc::new(pool);
    let started = Instant::now();
    let mut results = pool.results()?;

    // Submit from a separate task so small queue capacities
    // (backpressure) cannot deadlock the driver.
    let submitter = {
        let pool = Arc::clone(&pool);
        let jobs = cli.jobs;
        tokio::spawn(async move {
            for i in 1..=jobs {
                if let Err(error) = pool.submit_payload(format!("image-{i}.png")).await {
                    warn!(%error, "Submission stopped early");
                    return;
                }
            }
            match pool.close_submission() {
                Ok(()) => info!(jobs, "Submission closed"),
                Err(error) => warn!(%error, "Could not close submission"),
            }
        })
    };

    let mut completed = 0u64;
    let mut failed = 0u64;
    while let Some(result) = results.recv().await {
        match result.status {
            JobStatus::Completed => {
                completed += 1;
                info!(
                    job_id = %result.job_id,
                    worker_id = %result.worker_id,
                    value = result.value.as_deref().unwrap_or(""),
                    "Image processed"
                );
            }
            JobStatus::Failed => {
                failed += 1;
                warn!(
                    job_id = %result.job_id,
                    worker_id = %result.worker_id,
                    error = result.error.as_deref().unwrap_or(""),
                    "Image processing failed"
                );
            }
        }

        if cli.cancel_after > 0 && (completed + failed) as usize >= cli.cancel_after {
            pool.cancel();
        }
    }

    let _ = submitter.await;
    pool.drained().await;
    let stats = pool.stats();
    info!(
        jobs = cli.jobs,
        completed,
        failed,
        success_rate = stats.success_rate(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Run complete, pool drained"
    );

    Ok(())
}
