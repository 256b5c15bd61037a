//! Artifact retrieval.
//!
//! Both routes stream the stored file without buffering it and honour a
//! single-range `Range` header.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use tokio_util::io::ReaderStream;
use tracing::debug;

use cutline_models::JobId;
use cutline_storage::RangeOutcome;
use cutline_worker::ArtifactDownload;

use crate::error::{ApiError, ApiResult};
use crate::security::{content_disposition, is_valid_artifact_name};
use crate::state::AppState;

fn parse_job_id(raw: &str) -> ApiResult<JobId> {
    JobId::parse(raw).ok_or_else(|| ApiError::job_not_found(format!("Job not found: {}", raw)))
}

fn range_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::RANGE).and_then(|v| v.to_str().ok())
}

/// Build a streaming response for an opened artifact.
pub(crate) fn artifact_response(download: ArtifactDownload) -> ApiResult<Response> {
    let ArtifactDownload {
        artifact,
        download_name,
        read,
    } = download;
    let served = read.served_len();

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, artifact.kind.content_type())
        .header(header::CONTENT_LENGTH, served)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_DISPOSITION, content_disposition(&download_name))
        .header(header::CACHE_CONTROL, "private, max-age=3600");

    builder = match read.range.content_range(read.total_len) {
        Some(content_range) if matches!(read.range, RangeOutcome::Partial { .. }) => builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_RANGE, content_range),
        _ => builder.status(StatusCode::OK),
    };

    debug!(
        artifact = %artifact.filename(),
        served,
        total = read.total_len,
        "Streaming artifact"
    );

    builder
        .body(Body::from_stream(ReaderStream::new(read.reader)))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}

/// Download an artifact by the file name listed in `output_files`.
///
/// GET /api/download-cut/:job_id/:filename
pub async fn download_cut(
    State(state): State<AppState>,
    Path((job_id, filename)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let job_id = parse_job_id(&job_id)?;
    if !is_valid_artifact_name(&filename) {
        return Err(ApiError::ArtifactNotFound(format!(
            "Artifact not found: {}",
            filename
        )));
    }

    let artifact = state.artifacts.locate_by_name(&job_id, &filename).await?;
    let download = state.artifacts.open(&artifact, range_header(&headers)).await?;
    artifact_response(download)
}

/// Download the artifact of segment `ordinal` (1-based).
///
/// GET /api/jobs/:job_id/segments/:ordinal
pub async fn download_segment(
    State(state): State<AppState>,
    Path((job_id, ordinal)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let job_id = parse_job_id(&job_id)?;
    let ordinal: u32 = ordinal
        .parse()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ApiError::ArtifactNotFound(format!("Segment not found: {}", ordinal)))?;

    let artifact = state.artifacts.locate(&job_id, ordinal).await?;
    let download = state.artifacts.open(&artifact, range_header(&headers)).await?;
    artifact_response(download)
}
