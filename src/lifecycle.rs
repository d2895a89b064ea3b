//! Pool lifecycle: completion tracking and the drain coordinator.
//!
//! The coordinator is the only component allowed to close the result
//! channel. It runs as its own task, blocks until every worker has
//! exited, then drops the one result-channel sender it retains. Since
//! each worker's own sender clone is dropped when that worker exits,
//! the channel can only close after every result has been pushed.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::job::JobResult;

/// Observable pool state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Workers are running (or have not all exited yet).
    Running,
    /// Terminal: all workers exited and the result channel is closed.
    Drained,
}

impl std::fmt::Display for PoolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolState::Running => write!(f, "running"),
            PoolState::Drained => write!(f, "drained"),
        }
    }
}

/// Counts workers that have not yet exited.
///
/// Initialized to the worker count; decremented exactly once per worker
/// by an [`ExitGuard`] created at worker-loop entry, so a panicking
/// worker still decrements on unwind.
pub(crate) struct CompletionCounter {
    active: watch::Sender<usize>,
}

impl CompletionCounter {
    /// Creates a counter starting at `workers`.
    pub(crate) fn new(workers: usize) -> Self {
        let (active, _) = watch::channel(workers);
        Self { active }
    }

    /// Registers one worker exit to be recorded when the guard drops.
    pub(crate) fn guard(self: &Arc<Self>) -> ExitGuard {
        ExitGuard {
            counter: Arc::clone(self),
        }
    }

    /// Returns the number of workers still active.
    pub(crate) fn active(&self) -> usize {
        *self.active.borrow()
    }

    /// Waits until every worker has exited.
    pub(crate) async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        // The sender lives in `self`, so wait_for cannot fail here.
        let _ = rx.wait_for(|active| *active == 0).await;
    }

    fn record_exit(&self) {
        self.active.send_modify(|active| {
            debug_assert!(*active > 0, "worker exit recorded more times than workers started");
            *active = active.saturating_sub(1);
        });
    }
}

/// Scoped decrement-on-exit for one worker.
pub(crate) struct ExitGuard {
    counter: Arc<CompletionCounter>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.counter.record_exit();
        debug!(remaining = self.counter.active(), "Worker exit recorded");
    }
}

/// Coordinator task body: `Running -> Drained`.
///
/// `result_tx` is the retained sender whose drop closes the fan-in
/// channel; no other component may close it.
pub(crate) async fn coordinate<O>(
    counter: Arc<CompletionCounter>,
    result_tx: mpsc::Sender<JobResult<O>>,
    state: watch::Sender<PoolState>,
) {
    counter.wait_idle().await;
    drop(result_tx);
    let _ = state.send(PoolState::Drained);
    info!("All workers exited, result channel closed");
}
