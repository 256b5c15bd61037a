//! Search and whole-source download.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use cutline_models::{parse_download_format, DownloadFormat, SearchResult};
use cutline_worker::{SourceDescriptor, Thumbnail};

use crate::error::{ApiError, ApiResult};
use crate::handlers::artifacts::artifact_response;
use crate::handlers::sources::{quality_hint, required_url};
use crate::security::{content_disposition, sanitize_query};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub quality: Option<Value>,
}

/// GET /api/search?q=
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Json<Vec<SearchResult>>> {
    let query = sanitize_query(params.q.as_deref().unwrap_or_default());
    let results = state.facade.search(&query).await?;
    Ok(Json(results))
}

/// Cut a whole remote source into one artifact and return it as an
/// attachment. `format: "thumbnail"` returns the video's thumbnail instead.
///
/// POST /api/download
pub async fn download(
    State(state): State<AppState>,
    payload: Result<Json<DownloadRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;
    let url = required_url(request.url)?;
    let kind = match parse_download_format(request.format.as_deref().unwrap_or("video"))? {
        DownloadFormat::Media(kind) => kind,
        DownloadFormat::Thumbnail => {
            let thumbnail = state.facade.download_thumbnail(&url).await?;
            info!(name = %thumbnail.download_name, "Thumbnail ready");
            return thumbnail_response(thumbnail);
        }
    };
    let quality = quality_hint(request.quality.as_ref());

    let descriptor = SourceDescriptor::RemoteUrl {
        url,
        kind,
        quality,
    };
    let (job_id, artifact) = state.facade.download_whole(descriptor, kind, quality).await?;
    info!(job_id = %job_id, artifact = %artifact.filename(), "Whole download ready");

    let download = state.artifacts.open(&artifact, None).await?;
    artifact_response(download)
}

fn thumbnail_response(thumbnail: Thumbnail) -> ApiResult<Response> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, thumbnail.content_type)
        .header(header::CONTENT_LENGTH, thumbnail.bytes.len())
        .header(header::CONTENT_DISPOSITION, content_disposition(&thumbnail.download_name))
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from(thumbnail.bytes))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}
