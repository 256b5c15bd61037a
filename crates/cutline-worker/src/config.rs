//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use cutline_models::{EncodingConfig, DEFAULT_MAX_CUT_POINTS};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Maximum concurrent extractions across all jobs
    pub max_segment_parallel: usize,
    /// Upper bound on one segment extraction
    pub segment_timeout: Duration,
    /// Upper bound on one remote download
    pub download_timeout: Duration,
    /// Work directory for sources and artifacts
    pub work_dir: PathBuf,
    /// Maximum cut points accepted in one job
    pub max_cut_points: usize,
    /// Whether the retention sweeper runs
    pub retention_enabled: bool,
    /// Age after which finished jobs and idle sources are evicted
    pub retention_ttl: Duration,
    /// Interval between retention sweeps
    pub retention_sweep_interval: Duration,
    /// Video/audio encoder settings
    pub encoding: EncodingConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_segment_parallel: 3,
            segment_timeout: Duration::from_secs(600),
            download_timeout: Duration::from_secs(1800), // 30 minutes
            work_dir: PathBuf::from("/tmp/cutline"),
            max_cut_points: DEFAULT_MAX_CUT_POINTS,
            retention_enabled: true,
            retention_ttl: Duration::from_secs(3600),
            retention_sweep_interval: Duration::from_secs(60),
            encoding: EncodingConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut encoding = EncodingConfig::default();
        if let Ok(preset) = std::env::var("ENCODE_PRESET") {
            encoding = encoding.with_preset(preset);
        }
        if let Some(crf) = std::env::var("ENCODE_CRF").ok().and_then(|s| s.parse().ok()) {
            encoding = encoding.with_crf(crf);
        }
        if let Ok(bitrate) = std::env::var("ENCODE_AUDIO_BITRATE") {
            encoding.audio_bitrate = bitrate;
        }

        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            max_segment_parallel: std::env::var("WORKER_MAX_SEGMENT_PARALLEL")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_segment_parallel),
            segment_timeout: Duration::from_secs(
                std::env::var("WORKER_SEGMENT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            download_timeout: Duration::from_secs(
                std::env::var("WORKER_DOWNLOAD_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            max_cut_points: std::env::var("WORKER_MAX_CUT_POINTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_cut_points),
            retention_enabled: std::env::var("RETENTION_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            retention_ttl: Duration::from_secs(
                std::env::var("RETENTION_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            retention_sweep_interval: Duration::from_secs(
                std::env::var("RETENTION_SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(60),
            ),
            encoding,
        }
    }

    /// Config rooted at `work_dir`, other values default.
    pub fn with_work_dir(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            ..Self::default()
        }
    }

    /// Directory holding resolved sources, one subdirectory per source.
    pub fn sources_dir(&self) -> PathBuf {
        self.work_dir.join("sources")
    }

    /// Root of the artifact store.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.work_dir.join("artifacts")
    }

    /// Directory uploads are spooled into before resolution.
    pub fn uploads_dir(&self) -> PathBuf {
        self.work_dir.join("uploads")
    }

    /// Scratch space for thumbnail downloads, emptied after each request.
    pub fn thumbnails_dir(&self) -> PathBuf {
        self.work_dir.join("thumbnails")
    }
}
