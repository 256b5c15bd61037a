//! Segmentation jobs.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::artifact::ArtifactRef;
use crate::cut::CutSpec;
use crate::job_status::{JobStatus, SegmentStatus};
use crate::kind::{MediaKind, QualityHint};
use crate::source::SourceId;

/// Unique identifier for a job (random UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parse a client-supplied ID; `None` unless it is a UUID.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim())
            .ok()
            .map(|u| Self(u.hyphenated().to_string()))
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of cutting one [`CutSpec`]. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentResult {
    /// 1-based position of the cut in the submitted list
    pub ordinal: u32,
    pub status: SegmentStatus,
    /// Present iff `status == Succeeded`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRef>,
    /// Present iff `status == Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SegmentResult {
    pub fn succeeded(artifact: ArtifactRef) -> Self {
        Self {
            ordinal: artifact.ordinal,
            status: SegmentStatus::Succeeded,
            artifact: Some(artifact),
            error_message: None,
        }
    }

    pub fn failed(ordinal: u32, message: impl Into<String>) -> Self {
        Self {
            ordinal,
            status: SegmentStatus::Failed,
            artifact: None,
            error_message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SegmentStatus::Succeeded
    }
}

/// Invariant violations when mutating a [`Job`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobStateError {
    #[error("Cannot move job from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Segment ordinal {ordinal} is out of range (job has {count} cut points)")]
    OrdinalOutOfRange { ordinal: u32, count: usize },

    #[error("Segment {0} already has a result")]
    DuplicateSegment(u32),

    #[error("Segments can only be recorded while the job is running (status: {0})")]
    NotRunning(JobStatus),
}

/// A unit of asynchronous work: every cut point submitted together for one source.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,
    pub source_id: SourceId,
    /// Source title, used for download names
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub cut_specs: Vec<CutSpec>,
    pub output_kind: MediaKind,
    #[serde(default)]
    pub quality: QualityHint,
    pub status: JobStatus,
    /// Ordered by ordinal; never longer than `cut_specs`
    pub segments: Vec<SegmentResult>,
    /// Set when a job-level precondition failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a queued job.
    pub fn new(source_id: SourceId, cut_specs: Vec<CutSpec>, output_kind: MediaKind) -> Self {
        Self {
            id: JobId::new(),
            source_id,
            title: None,
            cut_specs,
            output_kind,
            quality: QualityHint::default(),
            status: JobStatus::Queued,
            segments: Vec::new(),
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_quality(mut self, quality: QualityHint) -> Self {
        self.quality = quality;
        self
    }

    /// Apply a forward status transition and stamp its timestamps.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), JobStateError> {
        if !self.status.can_transition_to(next) {
            return Err(JobStateError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        match next {
            JobStatus::Running => self.started_at = Some(now),
            JobStatus::Completed | JobStatus::Failed => self.finished_at = Some(now),
            JobStatus::Queued => {}
        }
        self.status = next;
        Ok(())
    }

    /// Move to `Failed` with a job-level error message.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), JobStateError> {
        self.transition(JobStatus::Failed)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    /// Record one segment result, keeping `segments` ordered by ordinal.
    pub fn record_segment(&mut self, result: SegmentResult) -> Result<(), JobStateError> {
        if self.status != JobStatus::Running {
            return Err(JobStateError::NotRunning(self.status));
        }
        let count = self.cut_specs.len();
        if result.ordinal == 0 || result.ordinal as usize > count {
            return Err(JobStateError::OrdinalOutOfRange {
                ordinal: result.ordinal,
                count,
            });
        }
        match self
            .segments
            .binary_search_by_key(&result.ordinal, |s| s.ordinal)
        {
            Ok(_) => Err(JobStateError::DuplicateSegment(result.ordinal)),
            Err(pos) => {
                self.segments.insert(pos, result);
                Ok(())
            }
        }
    }

    /// Result for a given ordinal, if recorded.
    pub fn segment(&self, ordinal: u32) -> Option<&SegmentResult> {
        self.segments
            .binary_search_by_key(&ordinal, |s| s.ordinal)
            .ok()
            .map(|idx| &self.segments[idx])
    }

    /// File names of successful segments, in ordinal order.
    pub fn output_files(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter_map(|s| s.artifact.as_ref().map(ArtifactRef::filename))
            .collect()
    }
}
