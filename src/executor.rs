//! Bounded worker pool for background cache rebuilds.

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

/// A unit of background work.
///
/// `work` performs the rebuild; `cleanup` always runs afterwards, whether
/// `work` succeeded, failed or panicked, and also when the task is rejected
/// at submission.
pub struct RebuildTask {
    label: String,
    work: BoxFuture<'static, Result<()>>,
    cleanup: BoxFuture<'static, ()>,
}

impl RebuildTask {
    pub fn new(
        label: impl Into<String>,
        work: BoxFuture<'static, Result<()>>,
        cleanup: BoxFuture<'static, ()>,
    ) -> Self {
        RebuildTask {
            label: label.into(),
            work,
            cleanup,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Counters describing executor activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Tasks accepted into the queue.
    pub submitted: u64,
    /// Tasks whose work returned `Ok`.
    pub completed: u64,
    /// Tasks whose work returned `Err` or panicked.
    pub failed: u64,
    /// Tasks refused because the queue was full or closed.
    pub rejected: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    idle: Notify,
}

impl Counters {
    fn pending(&self) -> u64 {
        let finished =
            self.completed.load(Ordering::Acquire) + self.failed.load(Ordering::Acquire);
        self.submitted.load(Ordering::Acquire).saturating_sub(finished)
    }
}

/// Fixed-size pool of tokio workers draining a bounded queue.
///
/// Submitters never wait for a rebuild to run: [`submit`](Self::submit)
/// either enqueues the task or rejects it immediately when the queue is full.
/// A rejected rebuild is simply skipped; the next stale reader will try
/// again.
///
/// Must be created from within a tokio runtime.
pub struct RebuildExecutor {
    sender: mpsc::Sender<RebuildTask>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl RebuildExecutor {
    /// Spawn `workers` workers sharing a queue of `queue_capacity` slots.
    ///
    /// # Errors
    /// `Error::ConfigError` when either value is zero.
    pub fn new(workers: usize, queue_capacity: usize) -> Result<Self> {
        if workers == 0 || queue_capacity == 0 {
            return Err(Error::ConfigError(
                "rebuild executor needs at least one worker and one queue slot".to_string(),
            ));
        }

        let (sender, receiver) = mpsc::channel(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let workers = (0..workers)
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                let counters = Arc::clone(&counters);
                tokio::spawn(worker_loop(id, receiver, counters))
            })
            .collect::<Vec<_>>();

        info!(
            "✓ Rebuild executor started ({} workers, queue capacity {})",
            workers.len(),
            queue_capacity
        );

        Ok(RebuildExecutor {
            sender,
            workers,
            counters,
        })
    }

    /// Enqueue a task without waiting for it to run.
    ///
    /// # Errors
    /// `Error::RebuildRejected` when the queue is full or shut down. The
    /// task's cleanup has already run when this is returned.
    pub async fn submit(&self, task: RebuildTask) -> Result<()> {
        // Counted before the send so a fast worker cannot finish first.
        self.counters.submitted.fetch_add(1, Ordering::AcqRel);

        match self.sender.try_send(task) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.counters.submitted.fetch_sub(1, Ordering::AcqRel);
                self.counters.rejected.fetch_add(1, Ordering::AcqRel);

                let (task, reason) = match err {
                    mpsc::error::TrySendError::Full(task) => (task, "queue full"),
                    mpsc::error::TrySendError::Closed(task) => (task, "executor shut down"),
                };
                let label = task.label;
                task.cleanup.await;

                warn!("⚠ Rebuild {} rejected: {}", label, reason);
                Err(Error::RebuildRejected(format!("{}: {}", label, reason)))
            }
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            submitted: self.counters.submitted.load(Ordering::Acquire),
            completed: self.counters.completed.load(Ordering::Acquire),
            failed: self.counters.failed.load(Ordering::Acquire),
            rejected: self.counters.rejected.load(Ordering::Acquire),
        }
    }

    /// Accepted tasks that have not finished yet.
    pub fn pending(&self) -> u64 {
        self.counters.pending()
    }

    /// Wait until every accepted task has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.counters.idle.notified();
            if self.counters.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting tasks, drain the queue and wait for the workers.
    pub async fn shutdown(self) {
        let RebuildExecutor {
            sender, workers, ..
        } = self;
        drop(sender);

        for worker in workers {
            if let Err(e) = worker.await {
                error!("Rebuild worker terminated abnormally: {}", e);
            }
        }
        info!("✓ Rebuild executor shut down");
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<RebuildTask>>>,
    counters: Arc<Counters>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };

        let RebuildTask {
            label,
            work,
            cleanup,
        } = task;

        let succeeded = match AssertUnwindSafe(work).catch_unwind().await {
            Ok(Ok(())) => {
                debug!("✓ Worker {} finished rebuild {}", id, label);
                true
            }
            Ok(Err(e)) => {
                error!("✗ Worker {} rebuild {} failed: {}", id, label, e);
                false
            }
            Err(_) => {
                error!("✗ Worker {} rebuild {} panicked", id, label);
                false
            }
        };

        // A task only counts as finished once its cleanup has run.
        cleanup.await;
        if succeeded {
            counters.completed.fetch_add(1, Ordering::AcqRel);
        } else {
            counters.failed.fetch_add(1, Ordering::AcqRel);
        }
        counters.idle.notify_waiters();
    }

    debug!("Rebuild worker {} exiting", id);
}
