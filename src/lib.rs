//! taskmill: concurrent task-execution core.
//!
//! A bounded FIFO job queue fans work out to a fixed-size pool of async
//! workers; their results converge on a single fan-in channel that a
//! lifecycle coordinator closes exactly once, after the last worker has
//! exited. Consumers detect completion simply by draining the result
//! stream to its end; no polling, no sentinel values.
//!
//! # Example
//!
//! ```rust,ignore
//! use taskmill::{Job, PoolConfig, WorkerPool};
//!
//! let pool = WorkerPool::start_fn(PoolConfig::new(5), |name: String| async move {
//!     Ok(format!("processed {name}"))
//! })?;
//!
//! for i in 1..=20 {
//!     pool.submit(Job::new(format!("image-{i}.png"))).await?;
//! }
//! pool.close_submission()?;
//!
//! let mut results = pool.results()?;
//! while let Some(result) = results.recv().await {
//!     println!("{}: {}", result.job_id, result.status);
//! }
//! assert!(pool.is_drained());
//! ```
//!
//! Results arrive in completion order across workers, which is not the
//! submission order of jobs; only a single-worker pool preserves order.

pub mod cli;
pub mod handler;
pub mod job;
pub mod lifecycle;
pub mod queue;
pub mod worker_pool;

// Re-export main types for convenience
pub use handler::{handler_fn, FnHandler, JobHandler};
pub use job::{Job, JobError, JobResult, JobStatus};
pub use lifecycle::PoolState;
pub use queue::{JobQueue, QueueError};
pub use worker_pool::{PoolConfig, PoolError, PoolStats, ResultStream, WorkerPool};
