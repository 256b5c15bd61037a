//! In-memory job store.
//!
//! This crate provides:
//! - Job registration and snapshot reads
//! - Forward-only status transitions and single-claim job start
//! - Ordered, duplicate-free segment result recording

pub mod error;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use store::JobStore;
