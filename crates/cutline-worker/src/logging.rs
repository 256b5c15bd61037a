//! Structured job logging.
//!
//! Every record carries `job_id` and `operation` fields so a job's lifecycle
//! can be followed across the scheduler, the facade and the extraction
//! tasks it fans out to.

use std::time::Instant;

use tracing::{error, info, warn, Span};

use cutline_models::{CutSpec, JobId, SegmentResult};

/// Lifecycle logger for one job run.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    operation: &'static str,
    started: Instant,
}

impl JobLogger {
    /// `operation` names the entry point, e.g. "segmentation" or "download_whole".
    pub fn new(job_id: &JobId, operation: &'static str) -> Self {
        Self {
            job_id: job_id.clone(),
            operation,
            started: Instant::now(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, operation = self.operation, "Job started: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, operation = self.operation, "Job warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = self.operation,
            elapsed_secs = self.elapsed_secs(),
            "Job failed: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            elapsed_secs = self.elapsed_secs(),
            "Job completed: {}", message
        );
    }

    /// Record the outcome of one extraction.
    ///
    /// Successful segments log at info, failed ones at warn with the cause.
    pub fn log_segment(&self, cut: &CutSpec, result: &SegmentResult) {
        match &result.error_message {
            None => info!(
                job_id = %self.job_id,
                ordinal = result.ordinal,
                start_secs = cut.start_secs,
                end_secs = cut.end_secs,
                "Segment ready"
            ),
            Some(cause) => warn!(
                job_id = %self.job_id,
                ordinal = result.ordinal,
                start_secs = cut.start_secs,
                end_secs = cut.end_secs,
                cause = %cause,
                "Segment failed"
            ),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        self.operation
    }

    /// Seconds since the logger was created.
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Span the job's extraction tasks are instrumented with.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, operation = self.operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutline_models::{ArtifactRef, MediaKind};

    #[test]
    fn test_job_logger_fields() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "segmentation");

        assert_eq!(logger.job_id(), &job_id);
        assert_eq!(logger.operation(), "segmentation");
        assert!(logger.elapsed_secs() >= 0.0);
    }

    #[test]
    fn test_log_segment_accepts_both_outcomes() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "segmentation");
        let cut = CutSpec::new(0.0, 10.0).unwrap();

        logger.log_segment(
            &cut,
            &SegmentResult::succeeded(ArtifactRef::new(job_id.clone(), 1, MediaKind::Audio)),
        );
        logger.log_segment(&cut, &SegmentResult::failed(2, "Source has no video stream"));
    }
}
