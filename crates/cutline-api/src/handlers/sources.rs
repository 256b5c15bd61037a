//! Source metadata and preparation handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use cutline_models::{parse_output_kind, MediaKind, QualityHint};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct VideoInfoRequest {
    #[serde(default)]
    pub url: Option<String>,
}

/// Metadata shown before a job is submitted.
#[derive(Debug, Serialize)]
pub struct VideoInfoResponse {
    pub title: String,
    /// Approximate size in bytes, when the platform reports one
    pub size: Option<u64>,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PrepareRequest {
    #[serde(default)]
    pub url: Option<String>,
    /// `"1080"`, `"720p"`, `1080`, ...
    #[serde(default)]
    pub quality: Option<Value>,
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareResponse {
    /// Source id to pass as `sourceId` when submitting cuts
    pub video_id: String,
    pub title: String,
    pub size: u64,
    pub duration: Option<f64>,
}

// ============================================================================
// Helpers
// ============================================================================

/// Read a quality hint given either as a string or a number.
pub(crate) fn quality_hint(raw: Option<&Value>) -> QualityHint {
    match raw {
        Some(Value::String(s)) => QualityHint::parse(s),
        Some(Value::Number(n)) => QualityHint::parse(&n.to_string()),
        _ => QualityHint::default(),
    }
}

/// Output kind from an optional `format` field, defaulting to video.
pub(crate) fn output_kind(raw: Option<&str>) -> ApiResult<MediaKind> {
    Ok(parse_output_kind(raw.unwrap_or("video"))?)
}

pub(crate) fn required_url(url: Option<String>) -> ApiResult<String> {
    url.map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::bad_request("URL is required"))
}

// ============================================================================
// Handlers
// ============================================================================

/// Fetch title, size, duration and thumbnail without downloading.
///
/// POST /api/video-info
pub async fn video_info(
    State(state): State<AppState>,
    payload: Result<Json<VideoInfoRequest>, JsonRejection>,
) -> ApiResult<Json<VideoInfoResponse>> {
    let Json(request) = payload?;
    let url = required_url(request.url)?;

    let metadata = state.resolver.describe(&url).await?;

    Ok(Json(VideoInfoResponse {
        title: metadata.title,
        size: metadata.approximate_size,
        duration: metadata.duration,
        thumbnail: metadata.thumbnail,
    }))
}

/// Download a remote source once so later cuts reuse it.
///
/// POST /api/prepare-youtube
pub async fn prepare_source(
    State(state): State<AppState>,
    payload: Result<Json<PrepareRequest>, JsonRejection>,
) -> ApiResult<Json<PrepareResponse>> {
    let Json(request) = payload?;
    let url = required_url(request.url)?;
    let kind = output_kind(request.format.as_deref())?;
    let quality = quality_hint(request.quality.as_ref());

    let handle = state.resolver.resolve_remote(&url, kind, quality).await?;

    info!(
        source_id = %handle.id,
        title = %handle.title,
        size = handle.approximate_size_bytes,
        "Prepared remote source"
    );

    Ok(Json(PrepareResponse {
        video_id: handle.id.to_string(),
        title: handle.title,
        size: handle.approximate_size_bytes,
        duration: handle.duration_secs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quality_hint_accepts_strings_and_numbers() {
        assert_eq!(quality_hint(Some(&json!("720p"))).value(), Some(720));
        assert_eq!(quality_hint(Some(&json!(320))).value(), Some(320));
        assert_eq!(quality_hint(Some(&json!(null))), QualityHint::default());
        assert_eq!(quality_hint(None), QualityHint::default());
    }

    #[test]
    fn test_output_kind_defaults_to_video() {
        assert_eq!(output_kind(None).unwrap(), MediaKind::Video);
        assert_eq!(output_kind(Some("AUDIO")).unwrap(), MediaKind::Audio);
        let err = output_kind(Some("thumbnail")).unwrap_err();
        assert_eq!(err.to_string(), "Invalid format type");
    }

    #[test]
    fn test_required_url() {
        assert!(required_url(None).is_err());
        assert!(required_url(Some("  ".to_string())).is_err());
        assert_eq!(
            required_url(Some(" https://youtu.be/x ".to_string())).unwrap(),
            "https://youtu.be/x"
        );
    }
}
