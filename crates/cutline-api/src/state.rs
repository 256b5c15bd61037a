//! Application state.

use std::sync::Arc;

use cutline_media::{
    check_ffmpeg, check_ffprobe, check_ytdlp, FfmpegExtractor, FfprobeProber, MediaProber,
    SegmentExtractor, SourceFetcher, YtDlpFetcher,
};
use cutline_queue::JobStore;
use cutline_storage::ArtifactStore;
use cutline_worker::{
    ArtifactResolver, RetentionSweeper, SearchDownloadFacade, SegmentScheduler, SourceResolver,
    WorkerConfig,
};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub worker_config: Arc<WorkerConfig>,
    pub jobs: JobStore,
    pub resolver: Arc<SourceResolver>,
    pub scheduler: Arc<SegmentScheduler>,
    pub artifacts: ArtifactResolver,
    pub facade: Arc<SearchDownloadFacade>,
    pub sweeper: Arc<RetentionSweeper>,
}

impl AppState {
    /// Create application state backed by ffmpeg, ffprobe and yt-dlp.
    pub async fn new(config: ApiConfig, worker_config: WorkerConfig) -> anyhow::Result<Self> {
        for check in [check_ffmpeg, check_ffprobe, check_ytdlp] {
            if let Err(e) = check() {
                tracing::warn!("{}", e);
            }
        }

        tokio::fs::create_dir_all(&worker_config.work_dir).await?;

        let extractor = Arc::new(FfmpegExtractor::new(worker_config.encoding.clone()));
        Ok(Self::with_components(
            config,
            worker_config,
            Arc::new(YtDlpFetcher::new()),
            Arc::new(FfprobeProber),
            extractor,
        ))
    }

    /// Wire the services around the given media tool implementations.
    pub fn with_components(
        config: ApiConfig,
        worker_config: WorkerConfig,
        fetcher: Arc<dyn SourceFetcher>,
        prober: Arc<dyn MediaProber>,
        extractor: Arc<dyn SegmentExtractor>,
    ) -> Self {
        let jobs = JobStore::new();
        let store = ArtifactStore::new(worker_config.artifacts_dir());
        let resolver = Arc::new(SourceResolver::new(&worker_config, Arc::clone(&fetcher), prober));
        let scheduler = Arc::new(SegmentScheduler::new(
            &worker_config,
            jobs.clone(),
            Arc::clone(&resolver),
            store.clone(),
            extractor,
        ));
        let artifacts = ArtifactResolver::new(jobs.clone(), store.clone());
        let facade = Arc::new(SearchDownloadFacade::new(
            &worker_config,
            fetcher,
            Arc::clone(&resolver),
            Arc::clone(&scheduler),
            artifacts.clone(),
        ));
        let sweeper = Arc::new(RetentionSweeper::new(
            &worker_config,
            jobs.clone(),
            Arc::clone(&resolver),
            store,
        ));

        Self {
            config,
            worker_config: Arc::new(worker_config),
            jobs,
            resolver,
            scheduler,
            artifacts,
            facade,
            sweeper,
        }
    }
}
