//! Interfaces to the external media tools.
//!
//! The pipeline talks to FFmpeg, FFprobe and yt-dlp only through these
//! traits, so schedulers and resolvers can run against in-process fakes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use cutline_models::{MediaKind, SearchResult};

use crate::download::RemoteMetadata;
use crate::error::MediaResult;
use crate::probe::MediaInfo;

/// One segment extraction.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub start_secs: f64,
    pub duration_secs: f64,
    pub kind: MediaKind,
    /// MP3 bitrate, used for audio output only
    pub audio_kbps: u32,
    pub timeout_secs: u64,
}

/// Cuts `[start, start + duration)` of a local file into a new file.
#[async_trait]
pub trait SegmentExtractor: Send + Sync {
    /// Write the segment to `request.output`. Must not touch `request.input`.
    async fn extract(&self, request: &ExtractRequest) -> MediaResult<()>;
}

/// Reads container and stream information from a local file.
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo>;
}

/// Talks to remote hosting platforms.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Metadata only, no media bytes.
    async fn metadata(&self, url: &str) -> MediaResult<RemoteMetadata>;

    /// Download the media selected by `selector` into `dest_dir`.
    ///
    /// Returns the path of the downloaded file.
    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        selector: &str,
        timeout_secs: u64,
    ) -> MediaResult<PathBuf>;

    /// Search the default platform.
    async fn search(&self, query: &str, limit: usize) -> MediaResult<Vec<SearchResult>>;

    /// Fetch a single image over HTTP into `dest`, returning its size.
    async fn fetch_image(&self, image_url: &str, dest: &Path) -> MediaResult<u64>;

    /// Have the platform tool write the video's thumbnail into `dest_dir`,
    /// converted to JPEG where possible.
    async fn write_thumbnail(
        &self,
        url: &str,
        dest_dir: &Path,
        timeout_secs: u64,
    ) -> MediaResult<PathBuf>;
}
