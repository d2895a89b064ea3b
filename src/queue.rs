//! Bounded FIFO job queue feeding the worker pool.
//!
//! The queue is the only path from submitters to workers. It supports:
//!
//! - Blocking submit with backpressure when the queue is full
//! - Explicit, terminal close-for-writes (a second close is an error)
//! - Blocking dequeue that reports "closed and empty" instead of
//!   blocking forever, which is what lets workers exit deterministically
//!
//! # Delivery
//!
//! The receive side is shared by all workers behind an async mutex, so
//! each job is handed to exactly one worker. FIFO order is preserved on
//! delivery; processing order across workers is up to the scheduler.

use std::sync::Mutex as StdMutex;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::job::Job;

/// Errors that can occur during queue operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue has been closed for writes; no new jobs are accepted.
    #[error("Queue is closed for writes")]
    Closed,

    /// The queue was already closed; closing twice is a programming error.
    #[error("Queue was already closed for writes")]
    AlreadyClosed,
}

/// Producer side of the job queue.
///
/// Cheap to share behind an `Arc`; `submit` and `close_for_writes` both
/// take `&self`.
pub struct JobQueue<T> {
    tx: StdMutex<Option<mpsc::Sender<Job<T>>>>,
    capacity: usize,
}

/// Consumer side of the job queue, shared by all workers.
///
/// Cloning shares the same underlying receiver; the mutex guarantees
/// single delivery per job.
pub(crate) struct JobReceiver<T> {
    rx: Arc<Mutex<mpsc::Receiver<Job<T>>>>,
}

impl<T> Clone for JobReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

impl<T> JobQueue<T> {
    /// Creates a bounded queue with the given capacity.
    ///
    /// Capacity at or above the expected job count makes the submitter
    /// effectively non-blocking; a smaller capacity exercises real
    /// backpressure. Both are supported configurations.
    pub(crate) fn bounded(capacity: usize) -> (Self, JobReceiver<T>) {
        let (tx, rx) = mpsc::channel(capacity);
        let queue = Self {
            tx: StdMutex::new(Some(tx)),
            capacity,
        };
        let receiver = JobReceiver {
            rx: Arc::new(Mutex::new(rx)),
        };
        (queue, receiver)
    }

    /// Enqueues a job, waiting for a free slot if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Closed` if the queue has been closed for
    /// writes (or the pool consuming it is gone).
    pub async fn submit(&self, job: Job<T>) -> Result<(), QueueError> {
        let tx = {
            let guard = self.tx.lock().expect("queue sender lock poisoned");
            guard.as_ref().cloned()
        };

        match tx {
            Some(tx) => tx.send(job).await.map_err(|_| QueueError::Closed),
            None => Err(QueueError::Closed),
        }
    }

    /// Closes the queue for writes. Terminal.
    ///
    /// Workers drain whatever is already enqueued and then observe the
    /// closure. Calling this twice is reported, not silently ignored.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::AlreadyClosed` on a second close.
    pub fn close_for_writes(&self) -> Result<(), QueueError> {
        let mut guard = self.tx.lock().expect("queue sender lock poisoned");
        match guard.take() {
            Some(tx) => {
                drop(tx);
                debug!("Job queue closed for writes");
                Ok(())
            }
            None => Err(QueueError::AlreadyClosed),
        }
    }

    /// Returns whether the queue has been closed for writes.
    pub fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .expect("queue sender lock poisoned")
            .is_none()
    }

    /// Returns the queue capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> JobReceiver<T> {
    /// Dequeues the next job.
    ///
    /// Waits while the queue is empty but open. Returns `None` once the
    /// queue is closed and fully drained; every subsequent call returns
    /// `None` as well.
    pub(crate) async fn next_job(&self) -> Option<Job<T>> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_and_dequeue_fifo() {
        let (queue, rx) = JobQueue::bounded(8);

        for i in 0..3 {
            queue
                .submit(Job::new(format!("job-{i}")))
                .await
                .expect("submit should succeed");
        }

        for i in 0..3 {
            let job = rx.next_job().await.expect("job should be available");
            assert_eq!(job.payload, format!("job-{i}"));
        }
    }

    #[tokio::test]
    async fn test_dequeue_after_close_and_drain() {
        let (queue, rx) = JobQueue::<String>::bounded(4);

        queue
            .submit(Job::new("only".to_string()))
            .await
            .expect("submit should succeed");
        queue.close_for_writes().expect("first close should succeed");

        assert!(rx.next_job().await.is_some());
        assert!(rx.next_job().await.is_none());
        // Closed-and-empty is sticky.
        assert!(rx.next_job().await.is_none());
    }

    #[tokio::test]
    async fn test_submit_after_close_fails() {
        let (queue, _rx) = JobQueue::<u32>::bounded(4);

        queue.close_for_writes().expect("first close should succeed");
        let err = queue.submit(Job::new(1)).await.unwrap_err();
        assert_eq!(err, QueueError::Closed);
    }

    #[tokio::test]
    async fn test_double_close_reported() {
        let (queue, _rx) = JobQueue::<u32>::bounded(4);

        assert!(!queue.is_closed());
        queue.close_for_writes().expect("first close should succeed");
        assert!(queue.is_closed());

        let err = queue.close_for_writes().unwrap_err();
        assert_eq!(err, QueueError::AlreadyClosed);
    }

    #[tokio::test]
    async fn test_backpressure_releases_on_dequeue() {
        let (queue, rx) = JobQueue::bounded(1);

        queue
            .submit(Job::new(1u32))
            .await
            .expect("first submit should succeed");

        // Queue is full; the second submit must wait until a slot frees.
        let second = tokio::spawn(async move {
            queue.submit(Job::new(2u32)).await.expect("submit should eventually succeed");
            queue
        });

        tokio::task::yield_now().await;
        assert_eq!(rx.next_job().await.map(|j| j.payload), Some(1));
        let queue = second.await.expect("submitter task should finish");
        assert_eq!(rx.next_job().await.map(|j| j.payload), Some(2));
        assert_eq!(queue.capacity(), 1);
    }

    #[test]
    fn test_queue_error_display() {
        assert!(QueueError::Closed.to_string().contains("closed"));
        assert!(QueueError::AlreadyClosed.to_string().contains("already"));
    }
}
