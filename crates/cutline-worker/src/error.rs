//! Worker error types.

use thiserror::Error;

use cutline_media::MediaError;
use cutline_models::{CutSpecError, JobId, JobStatus, MediaKind, SourceId, UrlRejection};
use cutline_queue::QueueError;
use cutline_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;
pub type SourceResult<T> = Result<T, SourceError>;
pub type LocateResult<T> = Result<T, LocateError>;

/// A source could not be turned into a usable handle.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{0}")]
    Rejected(#[from] UrlRejection),

    #[error("Could not fetch source: {0}")]
    Unreachable(String),

    #[error("Uploaded file is empty")]
    EmptyUpload,

    #[error("Uploaded file is not a recognized {0} file")]
    NotMedia(MediaKind),

    #[error("Source is corrupt or unreadable: {0}")]
    Corrupt(String),

    #[error("Source duration is unknown")]
    UnknownDuration,

    #[error("Source not found: {0}")]
    NotFound(SourceId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// Whether the caller supplied something unusable, as opposed to a
    /// local failure.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, SourceError::Io(_))
    }
}

/// Artifact lookup failures.
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {job_id} is not completed (status: {status})")]
    JobNotCompleted { job_id: JobId, status: JobStatus },

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Artifact missing from storage: {0}")]
    ArtifactMissing(String),

    #[error("Requested range not satisfiable (artifact is {len} bytes)")]
    RangeNotSatisfiable { len: u64 },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl LocateError {
    pub fn artifact_not_found(msg: impl Into<String>) -> Self {
        Self::ArtifactNotFound(msg.into())
    }
}

impl From<StorageError> for LocateError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(name) => LocateError::ArtifactMissing(name),
            StorageError::RangeNotSatisfiable { len } => LocateError::RangeNotSatisfiable { len },
            other => LocateError::Storage(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Segment failed: {0}")]
    SegmentFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    CutSpec(#[from] CutSpecError),

    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn segment_failed(msg: impl Into<String>) -> Self {
        Self::SegmentFailed(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}
