//! Bounded pool for blocking work.
//!
//! In-process video decoding and JPEG encoding are CPU-bound and use
//! synchronous libraries. They run on tokio's blocking threads, with a
//! semaphore capping how many run at once so a burst of uploads cannot
//! starve the rest of the blocking pool.

use std::sync::Arc;
use tokio::sync::Semaphore;

/// Errors from running a blocking job.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The pool was closed before the job got a slot
    #[error("worker pool closed")]
    Closed,
    /// The job panicked or was cancelled by the runtime
    #[error("worker job failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Runs `job` on a blocking thread once a slot is free.
    pub async fn run<F, T>(&self, job: F) -> Result<T, WorkerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.permits.clone().acquire_owned().await.map_err(|_| WorkerError::Closed)?;
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        });
        Ok(handle.await?)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots not currently taken by a job.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
