//! Job submission and status polling.
//!
//! Submission validates the cut list and resolves the source before a job
//! exists; extraction itself is dispatched to the scheduler and the
//! handler returns `202` with the job id straight away.

use std::path::PathBuf;

use axum::extract::multipart::Field;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use cutline_media::remove_file_if_exists;
use cutline_models::{
    parse_cut_points_json, validate_request, CutSpec, Job, JobId, MediaKind, QualityHint,
    RawCutSpec, SourceHandle, SourceId,
};
use cutline_worker::{SourceDescriptor, SourceError};

use crate::error::{ApiError, ApiResult};
use crate::handlers::sources::{quality_hint, required_url};
use crate::metrics;
use crate::state::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CutRemoteRequest {
    #[serde(default)]
    pub url: Option<String>,
    /// Id returned by `/api/prepare-youtube`
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub cut_points: Vec<RawCutSpec>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub quality: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct SegmentView {
    pub ordinal: u32,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Job status response.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    /// queued, running, completed or failed
    pub status: String,
    /// Artifact file names of successful segments, in ordinal order
    pub output_files: Vec<String>,
    pub segments: Vec<SegmentView>,
    /// Number of cut points submitted
    pub total_segments: usize,
    /// Job-level failure, set only when status is failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        let output_files = job.output_files();
        let segments = job
            .segments
            .into_iter()
            .map(|s| SegmentView {
                ordinal: s.ordinal,
                status: s.status.as_str().to_string(),
                filename: s.artifact.as_ref().map(|a| a.filename()),
                error: s.error_message,
            })
            .collect();
        Self {
            job_id: job.id.to_string(),
            status: job.status.as_str().to_string(),
            output_files,
            segments,
            total_segments: job.cut_specs.len(),
            error: job.error_message,
        }
    }
}

/// Fields of the upload form.
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<SpooledUpload>,
    cut_points: Option<String>,
    format: Option<String>,
    quality: Option<String>,
}

#[derive(Debug)]
struct SpooledUpload {
    path: PathBuf,
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: u64,
}

// ============================================================================
// Helpers
// ============================================================================

async fn submit(state: &AppState, job: Job, origin: &str) -> (StatusCode, Json<SubmitResponse>) {
    let job_id = state.scheduler.submit(job).await;
    metrics::record_job_submitted(origin);
    info!(job_id = %job_id, origin, "Job submitted");
    (
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: job_id.to_string(),
        }),
    )
}

fn job_for(handle: SourceHandle, cuts: Vec<CutSpec>, kind: MediaKind) -> Job {
    Job::new(handle.id, cuts, kind).with_title(handle.title)
}

/// Stream one multipart field into a spool file.
async fn spool_field(mut field: Field<'_>, file: &mut tokio::fs::File) -> ApiResult<u64> {
    let mut written = 0u64;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

async fn discard_spool(form: &UploadForm) {
    if let Some(upload) = &form.file {
        if let Err(e) = remove_file_if_exists(&upload.path).await {
            warn!(path = %upload.path.display(), "Failed to remove spooled upload: {}", e);
        }
    }
}

/// Read the upload form, spooling the file part to disk.
///
/// On error nothing is left behind in the uploads directory.
async fn read_upload_form(state: &AppState, multipart: &mut Multipart) -> ApiResult<UploadForm> {
    let mut form = UploadForm::default();
    let result = read_fields(state, multipart, &mut form).await;
    if let Err(e) = result {
        discard_spool(&form).await;
        return Err(e);
    }
    Ok(form)
}

async fn read_fields(
    state: &AppState,
    multipart: &mut Multipart,
    form: &mut UploadForm,
) -> ApiResult<()> {
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                if form.file.is_some() {
                    return Err(ApiError::bad_request("Only one file may be uploaded"));
                }
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let (path, mut file) = state.resolver.create_spool_file().await?;
                form.file = Some(SpooledUpload {
                    path,
                    file_name,
                    content_type,
                    bytes: 0,
                });
                let bytes = spool_field(field, &mut file).await?;
                if let Some(upload) = form.file.as_mut() {
                    upload.bytes = bytes;
                }
            }
            "cutPoints" => form.cut_points = Some(field.text().await?),
            "format" => form.format = Some(field.text().await?),
            "quality" => form.quality = Some(field.text().await?),
            _ => {}
        }
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit cuts of a remote source, by URL or by a prepared source id.
///
/// POST /api/cut-youtube
pub async fn cut_remote(
    State(state): State<AppState>,
    payload: Result<Json<CutRemoteRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let Json(request) = payload?;
    let (cuts, kind) = validate_request(
        &request.cut_points,
        request.format.as_deref().unwrap_or("video"),
        state.worker_config.max_cut_points,
    )?;
    let quality = quality_hint(request.quality.as_ref());

    let handle = match request.source_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => {
            let id = SourceId::from_string(id.trim());
            state
                .resolver
                .get(&id)
                .await
                .ok_or(SourceError::NotFound(id))?
        }
        None => {
            let url = required_url(request.url)?;
            state.resolver.resolve_remote(&url, kind, quality).await?
        }
    };

    let job = job_for(handle, cuts, kind).with_quality(quality);
    Ok(submit(&state, job, "remote_url").await)
}

/// Submit cuts of an uploaded file.
///
/// POST /api/cut-video (multipart: `file`, `cutPoints`, `format`)
pub async fn cut_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let form = read_upload_form(&state, &mut multipart).await?;

    let validated = parse_cut_points_json(form.cut_points.as_deref().unwrap_or("[]")).and_then(|raw| {
        validate_request(
            &raw,
            form.format.as_deref().unwrap_or("video"),
            state.worker_config.max_cut_points,
        )
    });
    let (cuts, kind) = match validated {
        Ok(v) => v,
        Err(e) => {
            discard_spool(&form).await;
            return Err(e.into());
        }
    };

    let Some(upload) = form.file else {
        return Err(ApiError::bad_request("No file provided"));
    };
    metrics::record_upload_bytes(upload.bytes);

    let claimed_kind = upload
        .content_type
        .as_deref()
        .and_then(MediaKind::from_mime)
        .or_else(|| upload.file_name.as_deref().and_then(MediaKind::from_file_name))
        .unwrap_or(kind);

    // The resolver removes the spool file if the upload is rejected.
    let handle = state
        .resolver
        .resolve(SourceDescriptor::UploadFile {
            path: upload.path,
            claimed_kind,
            file_name: upload.file_name,
        })
        .await?;

    let quality = form
        .quality
        .as_deref()
        .map(QualityHint::parse)
        .unwrap_or_default();
    let job = job_for(handle, cuts, kind).with_quality(quality);
    Ok(submit(&state, job, "upload").await)
}

/// Poll a job.
///
/// GET /api/job-status/:job_id
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job_id = JobId::parse(&job_id)
        .ok_or_else(|| ApiError::job_not_found(format!("Job not found: {}", job_id)))?;
    let job = state.jobs.get(&job_id).await?;
    Ok(Json(job.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutline_models::{ArtifactRef, JobStatus, SegmentResult};

    #[test]
    fn test_status_response_shape() {
        let mut job = Job::new(
            SourceId::new(),
            vec![CutSpec::new(0.0, 60.0).unwrap(), CutSpec::new(3540.0, 3600.0).unwrap()],
            MediaKind::Video,
        );
        job.transition(JobStatus::Running).unwrap();
        let artifact = ArtifactRef::new(job.id.clone(), 1, MediaKind::Video);
        job.record_segment(SegmentResult::succeeded(artifact.clone())).unwrap();
        job.record_segment(SegmentResult::failed(2, "End time (3600s) exceeds source duration (600s)"))
            .unwrap();
        job.transition(JobStatus::Completed).unwrap();

        let response = JobStatusResponse::from(job);
        assert_eq!(response.status, "completed");
        assert_eq!(response.output_files, vec![artifact.filename()]);
        assert_eq!(response.total_segments, 2);
        assert_eq!(response.segments[0].filename, Some(artifact.filename()));
        assert_eq!(response.segments[1].status, "failed");
        assert!(response.segments[1].error.as_deref().unwrap().contains("exceeds"));

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("error").is_none());
        assert!(json["segments"][1].get("filename").is_none());
    }
}
