//! Job store error types.

use thiserror::Error;

use cutline_models::{JobId, JobStateError};

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error(transparent)]
    InvalidState(#[from] JobStateError),
}

impl QueueError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, QueueError::JobNotFound(_))
    }
}
