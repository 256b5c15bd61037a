//! In-memory job store.
//!
//! The outer map lock guards membership only; each job has its own lock so
//! status polls on one job never wait on segment writes to another.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use cutline_models::{Job, JobId, JobStateError, JobStatus, SegmentResult};

use crate::error::{QueueError, QueueResult};

type JobCell = Arc<RwLock<Job>>;

/// Shared, cloneable handle to the job table.
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<JobId, JobCell>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job and return its id.
    pub async fn create(&self, job: Job) -> JobId {
        let id = job.id.clone();
        let mut jobs = self.jobs.write().await;
        jobs.insert(id.clone(), Arc::new(RwLock::new(job)));
        metrics::gauge!("cutline_jobs_stored").set(jobs.len() as f64);
        debug!(job_id = %id, "Job created");
        id
    }

    async fn cell(&self, id: &JobId) -> QueueResult<JobCell> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| QueueError::JobNotFound(id.clone()))
    }

    /// Snapshot of a job.
    pub async fn get(&self, id: &JobId) -> QueueResult<Job> {
        let cell = self.cell(id).await?;
        let job = cell.read().await;
        Ok(job.clone())
    }

    /// Apply a mutation under the job's write lock.
    async fn update<T>(
        &self,
        id: &JobId,
        f: impl FnOnce(&mut Job) -> Result<T, JobStateError>,
    ) -> QueueResult<T> {
        let cell = self.cell(id).await?;
        let mut job = cell.write().await;
        Ok(f(&mut *job)?)
    }

    /// Forward status transition.
    pub async fn set_status(&self, id: &JobId, status: JobStatus) -> QueueResult<()> {
        self.update(id, |job| job.transition(status)).await
    }

    /// Claim a queued job for execution.
    ///
    /// Returns `false` when the job has already been claimed or finished.
    pub async fn try_start(&self, id: &JobId) -> QueueResult<bool> {
        self.update(id, |job| {
            if job.status != JobStatus::Queued {
                return Ok(false);
            }
            job.transition(JobStatus::Running)?;
            Ok(true)
        })
        .await
    }

    /// Record one segment outcome.
    pub async fn append_segment_result(&self, id: &JobId, result: SegmentResult) -> QueueResult<()> {
        self.update(id, |job| job.record_segment(result)).await
    }

    /// Move a running job to `Completed`.
    pub async fn complete(&self, id: &JobId) -> QueueResult<()> {
        self.set_status(id, JobStatus::Completed).await
    }

    /// Move a job to `Failed` with a job-level message.
    pub async fn fail(&self, id: &JobId, message: impl Into<String>) -> QueueResult<()> {
        let message = message.into();
        self.update(id, |job| job.fail(message)).await
    }

    /// Snapshots of every job.
    pub async fn snapshot_all(&self) -> Vec<Job> {
        let cells: Vec<JobCell> = self.jobs.read().await.values().cloned().collect();
        let mut jobs = Vec::with_capacity(cells.len());
        for cell in cells {
            jobs.push(cell.read().await.clone());
        }
        jobs
    }

    /// Jobs not yet completed or failed, including queued ones.
    pub async fn unfinished(&self) -> usize {
        let cells: Vec<JobCell> = self.jobs.read().await.values().cloned().collect();
        let mut count = 0;
        for cell in cells {
            if !cell.read().await.status.is_terminal() {
                count += 1;
            }
        }
        count
    }

    /// Drop a job, returning its last state.
    pub async fn remove(&self, id: &JobId) -> Option<Job> {
        let cell = {
            let mut jobs = self.jobs.write().await;
            let cell = jobs.remove(id);
            metrics::gauge!("cutline_jobs_stored").set(jobs.len() as f64);
            cell?
        };
        let job = cell.read().await.clone();
        Some(job)
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutline_models::{ArtifactRef, CutSpec, MediaKind, SourceId};

    fn job(cuts: usize) -> Job {
        let specs = (0..cuts)
            .map(|i| CutSpec::new(i as f64, i as f64 + 1.0).unwrap())
            .collect();
        Job::new(SourceId::new(), specs, MediaKind::Video)
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = JobStore::new();
        let id = store.create(job(2)).await;

        let snapshot = store.get(&id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Queued);
        assert_eq!(snapshot.cut_specs.len(), 2);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_unfinished_counts_queued_and_running() {
        let store = JobStore::new();
        let queued = store.create(job(1)).await;
        let running = store.create(job(1)).await;
        let failed = store.create(job(1)).await;
        assert_eq!(store.unfinished().await, 3);

        store.try_start(&running).await.unwrap();
        store.try_start(&failed).await.unwrap();
        store.fail(&failed, "boom").await.unwrap();
        assert_eq!(store.unfinished().await, 2);

        store.remove(&queued).await;
        assert_eq!(store.unfinished().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let store = JobStore::new();
        let err = store.get(&JobId::new()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store
            .set_status(&JobId::new(), JobStatus::Running)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_try_start_is_single_claim() {
        let store = JobStore::new();
        let id = store.create(job(1)).await;

        assert!(store.try_start(&id).await.unwrap());
        assert!(!store.try_start(&id).await.unwrap());

        store.complete(&id).await.unwrap();
        assert!(!store.try_start(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_backward_transition_rejected() {
        let store = JobStore::new();
        let id = store.create(job(1)).await;
        store.set_status(&id, JobStatus::Running).await.unwrap();
        store.complete(&id).await.unwrap();

        let err = store.set_status(&id, JobStatus::Running).await.unwrap_err();
        assert!(matches!(
            err,
            QueueError::InvalidState(JobStateError::InvalidTransition { .. })
        ));
        assert_eq!(store.get(&id).await.unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_segment_results_and_snapshot_isolation() {
        let store = JobStore::new();
        let id = store.create(job(2)).await;
        store.try_start(&id).await.unwrap();

        let before = store.get(&id).await.unwrap();
        store
            .append_segment_result(
                &id,
                SegmentResult::succeeded(ArtifactRef::new(id.clone(), 2, MediaKind::Video)),
            )
            .await
            .unwrap();
        store
            .append_segment_result(&id, SegmentResult::failed(1, "boom"))
            .await
            .unwrap();

        assert!(before.segments.is_empty());
        let after = store.get(&id).await.unwrap();
        assert_eq!(after.segments[0].ordinal, 1);
        assert_eq!(after.segments[1].ordinal, 2);
        assert!(store
            .append_segment_result(&id, SegmentResult::failed(1, "again"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_fail_before_start() {
        let store = JobStore::new();
        let id = store.create(job(1)).await;
        store.fail(&id, "source vanished").await.unwrap();

        let snapshot = store.get(&id).await.unwrap();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(snapshot.error_message.as_deref(), Some("source vanished"));
    }

    #[tokio::test]
    async fn test_remove_and_snapshot_all() {
        let store = JobStore::new();
        let a = store.create(job(1)).await;
        let _b = store.create(job(1)).await;

        assert_eq!(store.snapshot_all().await.len(), 2);
        assert!(store.remove(&a).await.is_some());
        assert!(store.remove(&a).await.is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_appends_from_many_tasks() {
        let store = JobStore::new();
        let id = store.create(job(20)).await;
        store.try_start(&id).await.unwrap();

        let tasks = (1..=20u32).map(|ordinal| {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move {
                store
                    .append_segment_result(&id, SegmentResult::failed(ordinal, "x"))
                    .await
            })
        });
        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        let snapshot = store.get(&id).await.unwrap();
        let ordinals: Vec<u32> = snapshot.segments.iter().map(|s| s.ordinal).collect();
        assert_eq!(ordinals, (1..=20).collect::<Vec<_>>());
    }
}
