//! Axum HTTP API server.
//!
//! This crate provides:
//! - Job submission for remote and uploaded sources
//! - Status polling and ranged artifact downloads
//! - Search and whole-source download
//! - Rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
