//! In-memory bookkeeping of running retrievals.
//!
//! Jobs exist only while a retrieval call is in flight. Registration returns
//! a [`JobGuard`] that removes the entry when dropped, so every exit path of
//! the retrieval (success, error, cancellation, panic) cleans up.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use strum::{Display, EnumString};
use tokio::time::Instant;

use crate::download::quality::QualityTier;

pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    /// Registered, waiting for a download slot
    Starting,
    Downloading,
    Completed,
    Failed,
    Cancelled,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Error
        )
    }
}

/// Snapshot of one job.
#[derive(Debug, Clone)]
pub struct RetrievalJob {
    pub id: JobId,
    pub url: String,
    pub tier: QualityTier,
    pub status: JobStatus,
    /// 0..=100, never decreasing while downloading
    pub progress: u8,
    pub started: Instant,
}

/// Process-wide job table.
#[derive(Clone, Default)]
pub struct JobTable {
    jobs: Arc<DashMap<JobId, RetrievalJob>>,
    next_id: Arc<AtomicU64>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a job in `Starting` state.
    pub fn register(&self, url: &str, tier: QualityTier) -> JobGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.jobs.insert(
            id,
            RetrievalJob {
                id,
                url: url.to_string(),
                tier,
                status: JobStatus::Starting,
                progress: 0,
                started: Instant::now(),
            },
        );
        log::debug!("Job {} registered for {}", id, url);
        JobGuard {
            table: self.clone(),
            id,
        }
    }

    /// Moves a job to `status`.
    ///
    /// A cancelled job stays cancelled; the retrieval notices at its next
    /// checkpoint.
    pub fn set_status(&self, id: JobId, status: JobStatus) {
        if let Some(mut job) = self.jobs.get_mut(&id) {
            if job.status == JobStatus::Cancelled && status != JobStatus::Cancelled {
                return;
            }
            job.status = status;
        }
    }

    /// Records progress; values below the current one are ignored.
    pub fn set_progress(&self, id: JobId, percent: u8) {
        if let Some(mut job) = self.jobs.get_mut(&id) {
            let percent = percent.min(100);
            if percent > job.progress {
                job.progress = percent;
            }
        }
    }

    /// Marks a job cancelled. Returns false if no such job is running.
    pub fn cancel(&self, id: JobId) -> bool {
        match self.jobs.get_mut(&id) {
            Some(mut job) if !job.status.is_terminal() => {
                job.status = JobStatus::Cancelled;
                log::info!("Job {} cancelled", id);
                true
            }
            _ => false,
        }
    }

    pub fn is_cancelled(&self, id: JobId) -> bool {
        self.jobs.get(&id).is_some_and(|job| job.status == JobStatus::Cancelled)
    }

    pub fn get(&self, id: JobId) -> Option<RetrievalJob> {
        self.jobs.get(&id).map(|job| job.clone())
    }

    /// Snapshot of all jobs, oldest first.
    pub fn snapshot(&self) -> Vec<RetrievalJob> {
        let mut jobs: Vec<RetrievalJob> = self.jobs.iter().map(|entry| entry.value().clone()).collect();
        jobs.sort_by_key(|job| job.id);
        jobs
    }

    /// Jobs currently holding a download slot.
    pub fn downloading(&self) -> usize {
        self.jobs
            .iter()
            .filter(|entry| entry.status == JobStatus::Downloading)
            .count()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn remove(&self, id: JobId) {
        if let Some((_, job)) = self.jobs.remove(&id) {
            log::debug!(
                "Job {} finished as {} after {:?}",
                id,
                job.status,
                job.started.elapsed()
            );
        }
    }
}

/// Removes its job from the table on drop.
pub struct JobGuard {
    table: JobTable,
    id: JobId,
}

impl JobGuard {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn set_status(&self, status: JobStatus) {
        self.table.set_status(self.id, status);
    }

    pub fn set_progress(&self, percent: u8) {
        self.table.set_progress(self.id, percent);
    }

    pub fn is_cancelled(&self) -> bool {
        self.table.is_cancelled(self.id)
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.table.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_drop_removes() {
        let table = JobTable::new();
        {
            let guard = table.register("https://example.com/a.mp4", QualityTier::P720);
            assert_eq!(table.len(), 1);
            assert_eq!(table.get(guard.id()).unwrap().status, JobStatus::Starting);
        }
        assert!(table.is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let table = JobTable::new();
        let a = table.register("a", QualityTier::P480);
        let b = table.register("b", QualityTier::P480);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_progress_is_monotonic() {
        let table = JobTable::new();
        let guard = table.register("u", QualityTier::P720);
        guard.set_status(JobStatus::Downloading);
        guard.set_progress(40);
        guard.set_progress(20);
        assert_eq!(table.get(guard.id()).unwrap().progress, 40);
        guard.set_progress(250);
        assert_eq!(table.get(guard.id()).unwrap().progress, 100);
    }

    #[test]
    fn test_cancel_sticks() {
        let table = JobTable::new();
        let guard = table.register("u", QualityTier::P720);
        assert!(table.cancel(guard.id()));
        guard.set_status(JobStatus::Downloading);
        assert!(guard.is_cancelled());
        assert_eq!(table.get(guard.id()).unwrap().status, JobStatus::Cancelled);
    }

    #[test]
    fn test_cancel_unknown_or_finished() {
        let table = JobTable::new();
        assert!(!table.cancel(99));
        let guard = table.register("u", QualityTier::P720);
        guard.set_status(JobStatus::Completed);
        assert!(!table.cancel(guard.id()));
    }

    #[test]
    fn test_snapshot_and_downloading_count() {
        let table = JobTable::new();
        let a = table.register("a", QualityTier::P720);
        let _b = table.register("b", QualityTier::P1080);
        a.set_status(JobStatus::Downloading);

        let snap = table.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].url, "a");
        assert_eq!(table.downloading(), 1);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(JobStatus::Downloading.to_string(), "downloading");
    }
}
