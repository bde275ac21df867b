//! Bounded worker pool for generation tasks.
//!
//! At most `size` tasks run at once; the rest wait for a permit. Shutdown
//! closes the pool to new work, waits a grace period for running tasks, then
//! cancels whatever is left. Cancelling drops the task's future, and with it
//! any child process (spawned with `kill_on_drop`).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Debug)]
pub struct WorkerPool {
    size: usize,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            permits: Arc::new(Semaphore::new(size)),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Tasks submitted and not yet finished (running or queued).
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Tasks currently holding a permit.
    pub fn running(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Submit `task`. The handle resolves to `None` if the task was cancelled
    /// by shutdown before finishing.
    pub fn spawn<F, T>(&self, label: &'static str, task: F) -> flix_core::Result<JoinHandle<Option<T>>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(flix_core::Error::Internal(format!(
                "worker pool is shutting down; rejected {label} task"
            )));
        }

        let permits = self.permits.clone();
        let cancel = self.cancel.clone();

        Ok(self.tracker.spawn(async move {
            let _permit = tokio::select! {
                permit = permits.acquire_owned() => permit.ok()?,
                _ = cancel.cancelled() => return None,
            };
            tracing::trace!(task = label, "Worker task started");

            tokio::select! {
                out = task => Some(out),
                _ = cancel.cancelled() => {
                    tracing::warn!(task = label, "Worker task abandoned at shutdown");
                    None
                }
            }
        }))
    }

    /// Stop accepting work, drain for up to `grace`, then cancel the rest.
    pub async fn shutdown(&self, grace: Duration) {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            tracing::info!(pending, "Draining worker pool");
        }

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            tracing::warn!(
                remaining = self.tracker.len(),
                "Grace period elapsed; cancelling remaining tasks"
            );
            self.cancel.cancel();
            self.tracker.wait().await;
        }
        tracing::info!("Worker pool stopped");
    }
}
