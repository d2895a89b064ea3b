//! Worker pool executing jobs from the shared queue.
//!
//! This module provides a pool of workers that process jobs from a
//! shared bounded queue. Each worker runs as an independent async task,
//! pulls one job at a time, executes the caller-supplied handler, and
//! pushes exactly one result onto the fan-in channel.
//!
//! # Features
//!
//! - Configurable number of workers and channel capacities
//! - Deterministic drain: close submission, consume results to the end
//! - Cancellation with broadcast channel (in-flight jobs complete)
//! - Pool statistics tracking
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!                      │  Submitter   │
//!                      └──────┬───────┘
//!                             │ submit / close_submission
//!                      ┌──────▼───────┐
//!                      │   JobQueue   │
//!                      └──────┬───────┘
//!         ┌───────────────────┼───────────────────┐
//!         ▼                   ▼                   ▼
//!    ┌─────────┐         ┌─────────┐         ┌─────────┐
//!    │ Worker 0│         │ Worker 1│         │ Worker W│
//!    └────┬────┘         └────┬────┘         └────┬────┘
//!         └───────────────────┼───────────────────┘
//!                      ┌──────▼───────┐
//!                      │ ResultStream │  closed once by the coordinator
//!                      └──────────────┘
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::Stream;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::handler::{handler_fn, JobHandler};
use crate::job::{Job, JobError, JobResult};
use crate::lifecycle::{self, CompletionCounter, ExitGuard, PoolState};
use crate::queue::{JobQueue, JobReceiver, QueueError};

/// Errors that can occur constructing or misusing the pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// The pool needs at least one worker.
    #[error("Worker count must be at least 1")]
    InvalidWorkerCount,

    /// Channel capacities must be at least 1.
    #[error("Channel capacity must be at least 1: {0}")]
    InvalidCapacity(&'static str),

    /// The result stream is non-restartable and was already taken.
    #[error("Result stream was already taken")]
    ResultsAlreadyTaken,
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker tasks to start.
    pub workers: usize,
    /// Capacity of the job queue. At or above the expected job count the
    /// submitter never blocks; smaller values exercise backpressure.
    pub queue_capacity: usize,
    /// Capacity of the result channel.
    pub result_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
            result_capacity: 64,
        }
    }
}

impl PoolConfig {
    /// Creates a new configuration with the specified number of workers.
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            ..Default::default()
        }
    }

    /// Sets the job queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the result channel capacity.
    pub fn with_result_capacity(mut self, capacity: usize) -> Self {
        self.result_capacity = capacity;
        self
    }

    fn validate(&self) -> Result<(), PoolError> {
        if self.workers == 0 {
            return Err(PoolError::InvalidWorkerCount);
        }
        if self.queue_capacity == 0 {
            return Err(PoolError::InvalidCapacity("queue_capacity"));
        }
        if self.result_capacity == 0 {
            return Err(PoolError::InvalidCapacity("result_capacity"));
        }
        Ok(())
    }
}

/// Statistics about the worker pool.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Total number of workers started.
    pub workers: usize,
    /// Number of workers that have not exited yet.
    pub live_workers: usize,
    /// Number of workers currently processing a job.
    pub busy_workers: usize,
    /// Total number of jobs completed successfully.
    pub jobs_completed: u64,
    /// Total number of jobs whose handler failed.
    pub jobs_failed: u64,
    /// Average job processing duration.
    pub average_job_duration: Duration,
}

impl PoolStats {
    /// Returns the total number of jobs processed (completed + failed).
    pub fn total_processed(&self) -> u64 {
        self.jobs_completed + self.jobs_failed
    }

    /// Returns the success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.jobs_completed as f64 / total as f64) * 100.0
    }
}

/// Shared state for tracking pool statistics.
struct SharedPoolStats {
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    total_duration_ms: AtomicU64,
    busy_workers: AtomicU64,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            busy_workers: AtomicU64::new(0),
        }
    }

    fn record_completion(&self, duration: Duration) {
        self.jobs_completed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_failure(&self, duration: Duration) {
        self.jobs_failed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn increment_busy(&self) {
        self.busy_workers.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement_busy(&self) {
        self.busy_workers.fetch_sub(1, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, workers: usize, live_workers: usize) -> PoolStats {
        let completed = self.jobs_completed.load(Ordering::SeqCst);
        let failed = self.jobs_failed.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);
        let busy = self.busy_workers.load(Ordering::SeqCst);

        let total_jobs = completed + failed;
        let average_duration = if total_jobs > 0 {
            Duration::from_millis(total_duration_ms / total_jobs)
        } else {
            Duration::ZERO
        };

        PoolStats {
            workers,
            live_workers,
            busy_workers: busy as usize,
            jobs_completed: completed,
            jobs_failed: failed,
            average_job_duration: average_duration,
        }
    }
}

/// A single worker pulling jobs from the shared queue.
struct Worker<T: Send + 'static, O: Send + 'static> {
    /// Unique identifier for this worker.
    id: String,
    /// Shared receive side of the job queue.
    jobs: JobReceiver<T>,
    /// Caller-supplied processing function.
    handler: Arc<dyn JobHandler<T, O>>,
    /// Fan-in channel for results.
    results: mpsc::Sender<JobResult<O>>,
    /// Receiver for the cancellation signal.
    cancel_rx: broadcast::Receiver<()>,
    /// Keeps the cancellation channel open for the worker's lifetime, so
    /// dropping the pool cannot masquerade as a cancel.
    _cancel_alive: broadcast::Sender<()>,
    /// Shared statistics.
    stats: Arc<SharedPoolStats>,
}

impl<T, O> Worker<T, O>
where
    T: Send + 'static,
    O: Send + 'static,
{
    /// Main worker loop.
    ///
    /// Pulls jobs until the queue is closed and drained, or until a
    /// cancellation signal arrives. Handler failures are recorded in the
    /// result and never end the loop.
    async fn run(mut self, guard: ExitGuard) {
        info!(worker_id = %self.id, "Worker started");

        loop {
            let job = tokio::select! {
                biased;
                signal = self.cancel_rx.recv() => {
                    match signal {
                        Ok(()) => {
                            info!(worker_id = %self.id, "Worker received cancellation signal");
                            break;
                        }
                        // Cancellation is fire-once; a lagged receiver
                        // just looks again.
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                job = self.jobs.next_job() => match job {
                    Some(job) => job,
                    None => {
                        debug!(worker_id = %self.id, "Job queue closed and drained");
                        break;
                    }
                },
            };

            let result = self.process_job(job).await;
            if self.results.send(result).await.is_err() {
                // Result channel gone; nobody is listening anymore.
                warn!(worker_id = %self.id, "Result channel dropped, worker exiting");
                break;
            }
        }

        let id = self.id.clone();
        // Release this worker's result sender before recording the exit,
        // so the coordinator's drop is the one that closes the channel.
        drop(self);
        drop(guard);
        info!(worker_id = %id, "Worker stopped");
    }

    /// Processes a single job into exactly one result.
    async fn process_job(&self, job: Job<T>) -> JobResult<O> {
        let job_id = job.id;
        let start = Instant::now();

        debug!(worker_id = %self.id, job_id = %job_id, "Processing job");
        self.stats.increment_busy();
        let outcome = self.handler.handle(job.payload).await;
        self.stats.decrement_busy();

        let duration = start.elapsed();
        let duration_ms = duration.as_millis() as u64;

        match outcome {
            Ok(value) => {
                self.stats.record_completion(duration);
                debug!(
                    worker_id = %self.id,
                    job_id = %job_id,
                    duration_ms = duration_ms,
                    "Job completed"
                );
                JobResult::success(job_id, &self.id, value, duration_ms)
            }
            Err(error) => {
                self.stats.record_failure(duration);
                warn!(
                    worker_id = %self.id,
                    job_id = %job_id,
                    error = %error,
                    "Job failed"
                );
                JobResult::failure(job_id, &self.id, error, duration_ms)
            }
        }
    }
}

/// Fixed-size pool of workers over one job queue and one result channel.
///
/// Constructed and started in one step; not restartable. A typical run:
/// submit jobs, [`close_submission`](WorkerPool::close_submission), then
/// drain [`results`](WorkerPool::results) until the stream ends, which
/// happens exactly when the pool is [`PoolState::Drained`].
pub struct WorkerPool<T, O> {
    config: PoolConfig,
    queue: Arc<JobQueue<T>>,
    results_rx: StdMutex<Option<mpsc::Receiver<JobResult<O>>>>,
    cancel_tx: broadcast::Sender<()>,
    counter: Arc<CompletionCounter>,
    state_rx: watch::Receiver<PoolState>,
    stats: Arc<SharedPoolStats>,
}

impl<T, O> std::fmt::Debug for WorkerPool<T, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T, O> WorkerPool<T, O>
where
    T: Send + 'static,
    O: Send + 'static,
{
    /// Constructs the queue/result-channel pair and starts all workers
    /// plus the drain coordinator.
    ///
    /// # Errors
    ///
    /// Returns `PoolError` if the configuration is invalid. Misuse is
    /// rejected here, before any task is spawned.
    pub fn start(config: PoolConfig, handler: Arc<dyn JobHandler<T, O>>) -> Result<Self, PoolError> {
        config.validate()?;

        let (queue, job_rx) = JobQueue::bounded(config.queue_capacity);
        let (result_tx, result_rx) = mpsc::channel(config.result_capacity);
        let (cancel_tx, _) = broadcast::channel(1);
        let (state_tx, state_rx) = watch::channel(PoolState::Running);
        let counter = Arc::new(CompletionCounter::new(config.workers));
        let stats = Arc::new(SharedPoolStats::new());

        for i in 0..config.workers {
            let worker = Worker {
                id: format!("worker-{i}"),
                jobs: job_rx.clone(),
                handler: Arc::clone(&handler),
                results: result_tx.clone(),
                cancel_rx: cancel_tx.subscribe(),
                _cancel_alive: cancel_tx.clone(),
                stats: Arc::clone(&stats),
            };
            let guard = counter.guard();
            tokio::spawn(worker.run(guard));
        }

        // The coordinator retains the last result sender and drops it
        // only after the completion counter reaches zero.
        tokio::spawn(lifecycle::coordinate(
            Arc::clone(&counter),
            result_tx,
            state_tx,
        ));

        info!(workers = config.workers, "Worker pool started");

        Ok(Self {
            config,
            queue: Arc::new(queue),
            results_rx: StdMutex::new(Some(result_rx)),
            cancel_tx,
            counter,
            state_rx,
            stats,
        })
    }

    /// Starts a pool whose handler is a plain async closure.
    pub fn start_fn<F, Fut>(config: PoolConfig, f: F) -> Result<Self, PoolError>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, JobError>> + Send + 'static,
    {
        Self::start(config, Arc::new(handler_fn(f)))
    }

    /// Submits a job, waiting if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Closed` after `close_submission`.
    pub async fn submit(&self, job: Job<T>) -> Result<(), QueueError> {
        self.queue.submit(job).await
    }

    /// Submits a bare payload as a fresh job and returns its id.
    pub async fn submit_payload(&self, payload: T) -> Result<Uuid, QueueError> {
        let job = Job::new(payload);
        let id = job.id;
        self.queue.submit(job).await?;
        Ok(id)
    }

    /// Signals that no more jobs will be submitted. Terminal.
    ///
    /// Workers drain the queue and exit; the pool then reaches
    /// [`PoolState::Drained`] on its own.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::AlreadyClosed` on a second call.
    pub fn close_submission(&self) -> Result<(), QueueError> {
        self.queue.close_for_writes()
    }

    /// Takes the result stream: lazy, finite, non-restartable.
    ///
    /// The stream yields every result exactly once, in completion order
    /// across workers (not submission order), and ends when the pool is
    /// drained.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::ResultsAlreadyTaken` on a second call.
    pub fn results(&self) -> Result<ResultStream<O>, PoolError> {
        let rx = self
            .results_rx
            .lock()
            .expect("results receiver lock poisoned")
            .take()
            .ok_or(PoolError::ResultsAlreadyTaken)?;
        Ok(ResultStream {
            inner: ReceiverStream::new(rx),
        })
    }

    /// Requests cancellation: workers stop dequeuing new jobs, in-flight
    /// jobs complete and their results are still delivered.
    ///
    /// Idempotent; jobs left in the queue are discarded when the pool is
    /// dropped.
    pub fn cancel(&self) {
        if self.cancel_tx.send(()).is_ok() {
            info!("Pool cancellation requested");
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> PoolState {
        *self.state_rx.borrow()
    }

    /// Returns whether all workers exited and the result channel closed.
    pub fn is_drained(&self) -> bool {
        self.state() == PoolState::Drained
    }

    /// Waits until the pool reaches [`PoolState::Drained`].
    pub async fn drained(&self) {
        let mut rx = self.state_rx.clone();
        // An error means the coordinator finished; the final state is
        // already visible in the receiver.
        let _ = rx.wait_for(|state| *state == PoolState::Drained).await;
    }

    /// Returns current pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats
            .to_pool_stats(self.config.workers, self.counter.active())
    }

    /// Returns the number of workers in the pool.
    pub fn worker_count(&self) -> usize {
        self.config.workers
    }

    /// Returns a handle to the job queue, e.g. for an external submitter.
    pub fn queue(&self) -> &Arc<JobQueue<T>> {
        &self.queue
    }
}

/// Lazy, finite stream of job results.
///
/// Ends exactly when the pool reaches [`PoolState::Drained`].
pub struct ResultStream<O> {
    inner: ReceiverStream<JobResult<O>>,
}

impl<O> std::fmt::Debug for ResultStream<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStream").finish_non_exhaustive()
    }
}

impl<O> ResultStream<O> {
    /// Receives the next result, or `None` once the pool is drained.
    pub async fn recv(&mut self) -> Option<JobResult<O>> {
        use futures::StreamExt;
        self.inner.next().await
    }

    /// Drains the stream to completion, collecting every result.
    pub async fn collect_all(mut self) -> Vec<JobResult<O>> {
        let mut results = Vec::new();
        while let Some(result) = self.recv().await {
            results.push(result);
        }
        results
    }
}

impl<O> Stream for ResultStream<O> {
    type Item = JobResult<O>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();

        assert_eq!(config.workers, 4);
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.result_capacity, 64);
    }

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::new(8)
            .with_queue_capacity(128)
            .with_result_capacity(16);

        assert_eq!(config.workers, 8);
        assert_eq!(config.queue_capacity, 128);
        assert_eq!(config.result_capacity, 16);
    }

    #[test]
    fn test_pool_config_validation() {
        assert_eq!(
            PoolConfig::new(0).validate().unwrap_err(),
            PoolError::InvalidWorkerCount
        );
        assert_eq!(
            PoolConfig::new(1).with_queue_capacity(0).validate().unwrap_err(),
            PoolError::InvalidCapacity("queue_capacity")
        );
        assert_eq!(
            PoolConfig::new(1).with_result_capacity(0).validate().unwrap_err(),
            PoolError::InvalidCapacity("result_capacity")
        );
        assert!(PoolConfig::new(1).validate().is_ok());
    }

    #[test]
    fn test_pool_stats_default() {
        let stats = PoolStats::default();

        assert_eq!(stats.total_processed(), 0);
        assert!((stats.success_rate() - 0.0).abs() < f64::EPSILON);
        assert_eq!(stats.average_job_duration, Duration::ZERO);
    }

    #[test]
    fn test_pool_stats_calculations() {
        let stats = PoolStats {
            workers: 4,
            live_workers: 4,
            busy_workers: 2,
            jobs_completed: 80,
            jobs_failed: 20,
            average_job_duration: Duration::from_millis(50),
        };

        assert_eq!(stats.total_processed(), 100);
        assert!((stats.success_rate() - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shared_pool_stats() {
        let stats = SharedPoolStats::new();

        stats.record_completion(Duration::from_millis(10));
        stats.record_completion(Duration::from_millis(20));
        stats.record_failure(Duration::from_millis(30));

        let snapshot = stats.to_pool_stats(4, 3);

        assert_eq!(snapshot.workers, 4);
        assert_eq!(snapshot.live_workers, 3);
        assert_eq!(snapshot.jobs_completed, 2);
        assert_eq!(snapshot.jobs_failed, 1);
        assert_eq!(snapshot.average_job_duration, Duration::from_millis(20));
    }

    #[test]
    fn test_shared_pool_stats_busy_workers() {
        let stats = SharedPoolStats::new();

        stats.increment_busy();
        stats.increment_busy();
        assert_eq!(stats.busy_workers.load(Ordering::SeqCst), 2);

        stats.decrement_busy();
        assert_eq!(stats.busy_workers.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pool_error_display() {
        assert!(PoolError::InvalidWorkerCount.to_string().contains("at least 1"));
        assert!(PoolError::InvalidCapacity("queue_capacity")
            .to_string()
            .contains("queue_capacity"));
        assert!(PoolError::ResultsAlreadyTaken
            .to_string()
            .contains("already taken"));
    }

    #[tokio::test]
    async fn test_start_rejects_zero_workers() {
        let result = WorkerPool::<u32, u32>::start_fn(PoolConfig::new(0), |n| async move { Ok(n) });
        assert_eq!(result.unwrap_err(), PoolError::InvalidWorkerCount);
    }

    #[tokio::test]
    async fn test_results_taken_once() {
        let pool = WorkerPool::<u32, u32>::start_fn(PoolConfig::new(1), |n| async move { Ok(n) })
            .expect("pool should start");

        assert!(pool.results().is_ok());
        assert_eq!(pool.results().unwrap_err(), PoolError::ResultsAlreadyTaken);
    }
}
