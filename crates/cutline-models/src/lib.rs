//! Shared data models for Cutline.
//!
//! This crate provides Serde-serializable types for:
//! - Cut points, their timestamp grammar and validation
//! - Jobs, segment results and the job status lifecycle
//! - Resolved sources and remote URL acceptance
//! - Artifact references and deterministic artifact naming
//! - Encoding configuration and search results

pub mod artifact;
pub mod cut;
pub mod encoding;
pub mod job;
pub mod job_status;
pub mod kind;
pub mod search;
pub mod source;
pub mod timestamp;
pub mod utils;

// Re-export common types
pub use artifact::ArtifactRef;
pub use cut::{
    parse_cut_points_json, parse_download_format, parse_output_kind, validate_cut_specs,
    validate_request, CutSpec, CutSpecError, RawCutSpec, DEFAULT_MAX_CUT_POINTS,
};
pub use encoding::EncodingConfig;
pub use job::{Job, JobId, JobStateError, SegmentResult};
pub use job_status::{JobStatus, SegmentStatus};
pub use kind::{DownloadFormat, MediaKind, QualityHint};
pub use search::SearchResult;
pub use source::{validate_source_url, SourceHandle, SourceId, SourceOrigin, UrlRejection};
pub use timestamp::{format_seconds, parse_timestamp, TimestampError};
pub use utils::sanitize_filename_title;
