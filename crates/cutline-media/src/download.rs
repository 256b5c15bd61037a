//! Remote media access using yt-dlp.
//!
//! Metadata lookups, downloads and searches all shell out to `yt-dlp`.
//! Failures are classified so callers can tell a missing or private video
//! (permanent) from a network hiccup (worth retrying).

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use cutline_models::SearchResult;

use crate::command::{check_ytdlp, run_tool, stderr_tail};
use crate::core::SourceFetcher;
use crate::error::{MediaError, MediaResult};
use crate::thumbnail::{fetch_image, write_thumbnail};

/// Timeout for metadata and search calls.
const METADATA_TIMEOUT_SECS: u64 = 60;

/// Stem of the downloaded file inside its destination directory.
const DOWNLOAD_STEM: &str = "source";

/// Selector used when the requested one is not offered.
pub const FALLBACK_SELECTOR: &str = "best";

/// Stderr fragments meaning the media cannot be obtained at all.
const PERMANENT_MARKERS: &[&str] = &[
    "Video unavailable",
    "Private video",
    "This video has been removed",
    "This video is not available",
    "members-only",
    "Unsupported URL",
    "is not a valid URL",
    "HTTP Error 404",
    "HTTP Error 410",
    "account associated with this video has been terminated",
    "Sign in to confirm your age",
    "age-restricted",
    "not available in your country",
    "blocked it in your country",
    "This live event will begin",
    "Premieres in",
];

const FORMAT_UNAVAILABLE_MARKER: &str = "Requested format is not available";

/// Metadata of a remote video.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteMetadata {
    /// Platform-specific id
    pub id: String,
    pub title: String,
    /// Seconds; `None` for live streams or unknown
    pub duration: Option<f64>,
    /// Estimated size in bytes of the default format
    pub approximate_size: Option<u64>,
    pub thumbnail: Option<String>,
    /// Every listed thumbnail, in listing order
    pub thumbnails: Vec<ThumbnailCandidate>,
}

/// One entry of the `thumbnails` list in a `yt-dlp -J` dump.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThumbnailCandidate {
    pub url: String,
    pub width: u64,
    pub height: u64,
}

impl RemoteMetadata {
    /// Build from a `yt-dlp -J` dump.
    pub fn from_json(json: &Value) -> Self {
        let size_of = |v: &Value| {
            v.get("filesize")
                .and_then(Value::as_u64)
                .or_else(|| v.get("filesize_approx").and_then(Value::as_u64))
        };

        // Merged formats report sizes per component.
        let approximate_size = size_of(json).or_else(|| {
            let parts = json.get("requested_formats")?.as_array()?;
            let sizes: Option<Vec<u64>> = parts.iter().map(size_of).collect();
            sizes.map(|s| s.iter().sum())
        });

        Self {
            id: json
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            title: json
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("Untitled")
                .to_string(),
            duration: json
                .get("duration")
                .and_then(Value::as_f64)
                .filter(|d| *d > 0.0),
            approximate_size,
            thumbnail: json
                .get("thumbnail")
                .and_then(Value::as_str)
                .map(str::to_string),
            thumbnails: json
                .get("thumbnails")
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .filter_map(|t| {
                            Some(ThumbnailCandidate {
                                url: t.get("url")?.as_str()?.to_string(),
                                width: t.get("width").and_then(Value::as_u64).unwrap_or(0),
                                height: t.get("height").and_then(Value::as_u64).unwrap_or(0),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// URL of the largest listed thumbnail by pixel area, else the
    /// default `thumbnail` field.
    ///
    /// Ties keep the earliest entry.
    pub fn best_thumbnail(&self) -> Option<&str> {
        let mut best: Option<&ThumbnailCandidate> = None;
        for candidate in &self.thumbnails {
            let area = candidate.width.saturating_mul(candidate.height);
            if best.map_or(true, |b| area > b.width.saturating_mul(b.height)) {
                best = Some(candidate);
            }
        }
        best.map(|t| t.url.as_str()).or(self.thumbnail.as_deref())
    }
}

/// Turn a failed yt-dlp run's stderr into an error.
pub fn classify_failure(stderr: &str) -> MediaError {
    let last = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("Unknown error")
        .trim()
        .to_string();

    if PERMANENT_MARKERS.iter().any(|m| stderr.contains(m)) {
        MediaError::unavailable(last)
    } else {
        MediaError::download_failed(format!("yt-dlp failed: {}", last))
    }
}

pub(crate) async fn run_ytdlp(
    args: Vec<String>,
    timeout_secs: u64,
) -> MediaResult<std::process::Output> {
    check_ytdlp()?;
    debug!("Running yt-dlp {}", args.join(" "));

    let output = run_tool("yt-dlp", &args, Some(Duration::from_secs(timeout_secs))).await?;
    if output.status.success() {
        Ok(output)
    } else {
        let stderr = stderr_tail(&output.stderr);
        debug!("yt-dlp stderr: {}", stderr);
        Err(classify_failure(&stderr))
    }
}

/// Fetch metadata for a single video.
pub async fn fetch_metadata(url: &str) -> MediaResult<RemoteMetadata> {
    let args = vec![
        "-J".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        url.to_string(),
    ];
    let output = run_ytdlp(args, METADATA_TIMEOUT_SECS).await?;
    let json: Value = serde_json::from_slice(&output.stdout)?;
    Ok(RemoteMetadata::from_json(&json))
}

/// Download `url` into `dest_dir`, falling back to [`FALLBACK_SELECTOR`]
/// when the requested format is not offered.
pub async fn download_media(
    url: &str,
    dest_dir: &Path,
    selector: &str,
    timeout_secs: u64,
) -> MediaResult<PathBuf> {
    tokio::fs::create_dir_all(dest_dir).await?;

    match download_with_selector(url, dest_dir, selector, timeout_secs).await {
        Err(MediaError::DownloadFailed { message })
            if message.contains(FORMAT_UNAVAILABLE_MARKER) && selector != FALLBACK_SELECTOR =>
        {
            warn!(url = %url, selector = %selector, "Requested format unavailable, retrying with best");
            download_with_selector(url, dest_dir, FALLBACK_SELECTOR, timeout_secs).await
        }
        other => other,
    }
}

async fn download_with_selector(
    url: &str,
    dest_dir: &Path,
    selector: &str,
    timeout_secs: u64,
) -> MediaResult<PathBuf> {
    info!(url = %url, selector = %selector, dest = %dest_dir.display(), "Downloading media");

    let template = dest_dir.join(format!("{}.%(ext)s", DOWNLOAD_STEM));
    let args = vec![
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--no-progress".to_string(),
        "--no-part".to_string(),
        "-f".to_string(),
        selector.to_string(),
        "--merge-output-format".to_string(),
        "mp4".to_string(),
        "--print".to_string(),
        "after_move:filepath".to_string(),
        "-o".to_string(),
        template.to_string_lossy().to_string(),
        url.to_string(),
    ];
    let output = run_ytdlp(args, timeout_secs).await?;

    let printed = String::from_utf8_lossy(&output.stdout)
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(PathBuf::from)
        .filter(|p| p.is_file());

    let path = match printed {
        Some(path) => path,
        None => find_download(dest_dir)
            .await?
            .ok_or_else(|| MediaError::download_failed("Output file not created"))?,
    };

    let size = tokio::fs::metadata(&path).await?.len();
    if size == 0 {
        return Err(MediaError::download_failed("Downloaded file is empty"));
    }

    info!(
        output = %path.display(),
        size_mb = size as f64 / (1024.0 * 1024.0),
        "Downloaded media successfully"
    );
    Ok(path)
}

async fn find_download(dest_dir: &Path) -> MediaResult<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dest_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_ours = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s == DOWNLOAD_STEM);
        if is_ours && path.is_file() {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Search YouTube, returning up to `limit` results.
pub async fn search_videos(query: &str, limit: usize) -> MediaResult<Vec<SearchResult>> {
    let args = vec![
        "-J".to_string(),
        "--flat-playlist".to_string(),
        "--no-warnings".to_string(),
        format!("ytsearch{}:{}", limit, query),
    ];
    let output = run_ytdlp(args, METADATA_TIMEOUT_SECS).await?;
    let json: Value = serde_json::from_slice(&output.stdout)?;
    Ok(parse_search_results(&json))
}

fn parse_search_results(json: &Value) -> Vec<SearchResult> {
    json.get("entries")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(SearchResult::from_entry).collect())
        .unwrap_or_default()
}

/// [`SourceFetcher`] backed by the `yt-dlp` binary.
///
/// Thumbnail images are fetched with its own HTTP client.
#[derive(Debug, Default, Clone)]
pub struct YtDlpFetcher {
    http: reqwest::Client,
}

impl YtDlpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SourceFetcher for YtDlpFetcher {
    async fn metadata(&self, url: &str) -> MediaResult<RemoteMetadata> {
        fetch_metadata(url).await
    }

    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        selector: &str,
        timeout_secs: u64,
    ) -> MediaResult<PathBuf> {
        download_media(url, dest_dir, selector, timeout_secs).await
    }

    async fn search(&self, query: &str, limit: usize) -> MediaResult<Vec<SearchResult>> {
        search_videos(query, limit).await
    }

    async fn fetch_image(&self, image_url: &str, dest: &Path) -> MediaResult<u64> {
        fetch_image(&self.http, image_url, dest).await
    }

    async fn write_thumbnail(
        &self,
        url: &str,
        dest_dir: &Path,
        timeout_secs: u64,
    ) -> MediaResult<PathBuf> {
        write_thumbnail(url, dest_dir, timeout_secs).await
    }
}
