//! Segmentation pipeline services.
//!
//! This crate provides:
//! - Source resolution with download-once caching and upload validation
//! - The segmentation scheduler with bounded job and extraction concurrency
//! - Artifact lookup and ranged retrieval
//! - One-shot search and whole-source download
//! - Retention of finished jobs, artifacts and idle sources

pub mod artifacts;
pub mod config;
pub mod error;
pub mod facade;
pub mod logging;
pub mod resolver;
pub mod retention;
pub mod retry;
pub mod scheduler;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use artifacts::{ArtifactDownload, ArtifactResolver};
pub use config::WorkerConfig;
pub use error::{
    LocateError, LocateResult, SourceError, SourceResult, WorkerError, WorkerResult,
};
pub use facade::{SearchDownloadFacade, Thumbnail, SEARCH_LIMIT};
pub use logging::JobLogger;
pub use resolver::{SourceDescriptor, SourceResolver};
pub use retention::{RetentionSweeper, SweepReport};
pub use retry::{retry_async, FailureTracker, RetryConfig};
pub use scheduler::{RunOutcome, SegmentScheduler};
