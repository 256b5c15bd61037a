//! One-shot search, whole-source download and thumbnail retrieval.
//!
//! A whole download is an ordinary job with a single cut spanning the
//! source. It runs on its own task through the same scheduler as every
//! other job; the caller only waits for that task.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use cutline_media::{remove_dir_if_exists, sniff_image, RemoteMetadata, SourceFetcher};
use cutline_models::{
    sanitize_filename_title, validate_source_url, ArtifactRef, CutSpec, Job, JobId, JobStatus,
    MediaKind, QualityHint, SearchResult, SourceId,
};

use crate::artifacts::ArtifactResolver;
use crate::config::WorkerConfig;
use crate::error::{LocateError, SourceError, WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::resolver::{SourceDescriptor, SourceResolver};
use crate::scheduler::SegmentScheduler;

/// Results returned by one search.
pub const SEARCH_LIMIT: usize = 10;

/// Limit for yt-dlp writing a thumbnail itself.
const THUMBNAIL_TIMEOUT_SECS: u64 = 120;

/// Attachment stem when the title is unknown or sanitizes to nothing.
const FALLBACK_THUMBNAIL_NAME: &str = "thumbnail";

/// A thumbnail image ready to be sent.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    /// `<title>.jpg`
    pub download_name: String,
}

/// Search, whole-download and thumbnail entry points.
pub struct SearchDownloadFacade {
    fetcher: Arc<dyn SourceFetcher>,
    resolver: Arc<SourceResolver>,
    scheduler: Arc<SegmentScheduler>,
    artifacts: ArtifactResolver,
    thumbnails_dir: PathBuf,
}

impl SearchDownloadFacade {
    pub fn new(
        config: &WorkerConfig,
        fetcher: Arc<dyn SourceFetcher>,
        resolver: Arc<SourceResolver>,
        scheduler: Arc<SegmentScheduler>,
        artifacts: ArtifactResolver,
    ) -> Self {
        Self {
            fetcher,
            resolver,
            scheduler,
            artifacts,
            thumbnails_dir: config.thumbnails_dir(),
        }
    }

    /// Search the default platform. Each call queries afresh.
    pub async fn search(&self, query: &str) -> WorkerResult<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(WorkerError::invalid_request("Search query is required"));
        }
        metrics::counter!("cutline_searches_total").increment(1);
        Ok(self.fetcher.search(query, SEARCH_LIMIT).await?)
    }

    /// Resolve a source and cut it whole into a single artifact.
    ///
    /// Returns once the artifact is committed.
    pub async fn download_whole(
        &self,
        descriptor: SourceDescriptor,
        kind: MediaKind,
        quality: QualityHint,
    ) -> WorkerResult<(JobId, ArtifactRef)> {
        let handle = self.resolver.resolve(descriptor).await?;
        let cut = handle
            .duration_secs
            .and_then(CutSpec::whole)
            .ok_or(SourceError::UnknownDuration)?;

        let job = Job::new(handle.id.clone(), vec![cut], kind)
            .with_title(handle.title.clone())
            .with_quality(quality);
        let job_id = self.scheduler.jobs().create(job).await;
        let logger = JobLogger::new(&job_id, "download_whole");
        logger.log_start(&format!("{} ({}s)", handle.title, cut.duration_secs()));

        // Dropping this future does not cancel the run; the job still
        // reaches a terminal state and is swept as usual.
        if let Err(e) = self.scheduler.dispatch(job_id.clone()).await {
            logger.log_error(&format!("job task aborted: {}", e));
            return Err(WorkerError::job_failed(format!("Job task aborted: {}", e)));
        }

        let job = self.scheduler.jobs().get(&job_id).await?;
        if !job.status.is_terminal() {
            return Err(WorkerError::job_failed(format!(
                "Job ended in state {}",
                job.status
            )));
        }
        if job.status == JobStatus::Failed {
            let message = job.error_message.unwrap_or_else(|| "unknown error".to_string());
            logger.log_error(&message);
            return Err(WorkerError::job_failed(message));
        }

        match self.artifacts.locate(&job_id, 1).await {
            Ok(artifact) => {
                logger.log_completion(&artifact.filename());
                Ok((job_id, artifact))
            }
            Err(LocateError::ArtifactNotFound(_)) => {
                let message = job
                    .segment(1)
                    .and_then(|s| s.error_message.clone())
                    .unwrap_or_else(|| "no output produced".to_string());
                logger.log_error(&message);
                Err(WorkerError::segment_failed(message))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch the thumbnail of a remote video.
    ///
    /// The largest thumbnail listed in the metadata is fetched directly;
    /// if there is none or the fetch fails, yt-dlp writes one instead.
    /// Nothing is kept on disk afterwards.
    pub async fn download_thumbnail(&self, url: &str) -> WorkerResult<Thumbnail> {
        let url = validate_source_url(url).map_err(SourceError::from)?;
        let metadata = match self.resolver.describe(url.as_str()).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!(url = %url, "Thumbnail metadata unavailable, asking yt-dlp: {}", e);
                None
            }
        };

        let scratch = self.thumbnails_dir.join(SourceId::new().as_str());
        let fetched = self.fetch_thumbnail(url.as_str(), metadata.as_ref(), &scratch).await;
        if let Err(e) = remove_dir_if_exists(&scratch).await {
            warn!("Failed to clean up {}: {}", scratch.display(), e);
        }
        let bytes = fetched?;

        let format = sniff_image(&bytes)
            .ok_or_else(|| SourceError::unreachable("Thumbnail is not a recognized image"))?;
        let stem = metadata
            .map(|m| sanitize_filename_title(&m.title))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| FALLBACK_THUMBNAIL_NAME.to_string());

        metrics::counter!("cutline_thumbnails_total").increment(1);
        info!(url = %url, bytes = bytes.len(), "Thumbnail ready");
        Ok(Thumbnail {
            bytes,
            content_type: format.content_type(),
            download_name: format!("{}.jpg", stem),
        })
    }

    async fn fetch_thumbnail(
        &self,
        url: &str,
        metadata: Option<&RemoteMetadata>,
        scratch: &Path,
    ) -> WorkerResult<Vec<u8>> {
        tokio::fs::create_dir_all(scratch).await?;

        if let Some(image_url) = metadata.and_then(RemoteMetadata::best_thumbnail) {
            let dest = scratch.join("best");
            match self.fetcher.fetch_image(image_url, &dest).await {
                Ok(_) => return Ok(tokio::fs::read(&dest).await?),
                Err(e) => warn!(url = %url, "Direct thumbnail fetch failed, asking yt-dlp: {}", e),
            }
        }

        let path = self
            .fetcher
            .write_thumbnail(url, scratch, THUMBNAIL_TIMEOUT_SECS)
            .await
            .map_err(|e| SourceError::unreachable(e.detail()))?;
        Ok(tokio::fs::read(&path).await?)
    }
}
