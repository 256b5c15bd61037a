//! Local artifact storage.
//!
//! This crate provides:
//! - Deterministic artifact paths per job
//! - Staged writes committed by atomic rename
//! - Ranged reads for HTTP delivery
//! - Per-job and full cleanup

pub mod error;
pub mod local;
pub mod range;

pub use error::{StorageError, StorageResult};
pub use local::{ArtifactRead, ArtifactStore};
pub use range::{resolve_range, RangeOutcome};
