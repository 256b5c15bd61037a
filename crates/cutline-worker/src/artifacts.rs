//! Artifact lookup and ranged retrieval.
//!
//! An artifact is only handed out for a segment recorded as succeeded in a
//! completed job, so a half-written or failed output is never exposed.

use cutline_models::{ArtifactRef, Job, JobId, JobStatus};
use cutline_queue::JobStore;
use cutline_storage::{ArtifactRead, ArtifactStore};

use crate::error::{LocateError, LocateResult};

/// A located artifact, ready to stream.
#[derive(Debug)]
pub struct ArtifactDownload {
    pub artifact: ArtifactRef,
    /// Friendly attachment name derived from the source title
    pub download_name: String,
    pub read: ArtifactRead,
}

/// Resolves `(job, ordinal)` and `(job, filename)` to stored artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    jobs: JobStore,
    store: ArtifactStore,
}

impl ArtifactResolver {
    pub fn new(jobs: JobStore, store: ArtifactStore) -> Self {
        Self { jobs, store }
    }

    async fn completed_job(&self, job_id: &JobId) -> LocateResult<Job> {
        let job = self
            .jobs
            .get(job_id)
            .await
            .map_err(|_| LocateError::JobNotFound(job_id.clone()))?;
        if job.status != JobStatus::Completed {
            return Err(LocateError::JobNotCompleted {
                job_id: job_id.clone(),
                status: job.status,
            });
        }
        Ok(job)
    }

    fn artifact_of(job: &Job, ordinal: u32) -> LocateResult<ArtifactRef> {
        let segment = job.segment(ordinal).ok_or_else(|| {
            LocateError::artifact_not_found(format!("job {} has no segment {}", job.id, ordinal))
        })?;
        segment.artifact.clone().ok_or_else(|| {
            LocateError::artifact_not_found(format!(
                "segment {} of job {} failed: {}",
                ordinal,
                job.id,
                segment.error_message.as_deref().unwrap_or("unknown error")
            ))
        })
    }

    /// Artifact of segment `ordinal` (1-based).
    pub async fn locate(&self, job_id: &JobId, ordinal: u32) -> LocateResult<ArtifactRef> {
        let job = self.completed_job(job_id).await?;
        Self::artifact_of(&job, ordinal)
    }

    /// Artifact by its stored file name.
    pub async fn locate_by_name(&self, job_id: &JobId, filename: &str) -> LocateResult<ArtifactRef> {
        let job = self.completed_job(job_id).await?;
        let parsed = ArtifactRef::parse_filename(filename)
            .filter(|a| &a.job_id == job_id)
            .ok_or_else(|| LocateError::artifact_not_found(filename.to_string()))?;

        let artifact = Self::artifact_of(&job, parsed.ordinal)?;
        if artifact != parsed {
            return Err(LocateError::artifact_not_found(filename.to_string()));
        }
        Ok(artifact)
    }

    /// Open a located artifact, honouring an optional `Range` header.
    pub async fn open(
        &self,
        artifact: &ArtifactRef,
        range_header: Option<&str>,
    ) -> LocateResult<ArtifactDownload> {
        let job = self
            .jobs
            .get(&artifact.job_id)
            .await
            .map_err(|_| LocateError::JobNotFound(artifact.job_id.clone()))?;
        let read = self.store.open(artifact, range_header).await?;
        metrics::counter!("cutline_artifact_reads_total", "kind" => artifact.kind.as_str())
            .increment(1);
        Ok(ArtifactDownload {
            artifact: artifact.clone(),
            download_name: artifact.download_name(job.title.as_deref()),
            read,
        })
    }
}
