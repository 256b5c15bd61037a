//! Thumbnail retrieval for remote videos.
//!
//! The largest thumbnail listed in a video's metadata is fetched directly
//! over HTTP. When that fails, yt-dlp writes the thumbnail itself.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::download::run_ytdlp;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::remove_file_if_exists;

/// Largest image accepted from a thumbnail URL.
pub const MAX_THUMBNAIL_BYTES: u64 = 20 * 1024 * 1024;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Output stem passed to yt-dlp; it appends the image extension.
const THUMBNAIL_STEM: &str = "thumbnail";

/// Extensions yt-dlp may leave behind, in order of preference.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Stream the image at `image_url` into `dest`.
///
/// Only http(s) URLs are followed. Bodies over [`MAX_THUMBNAIL_BYTES`]
/// are abandoned and the partial file removed.
pub async fn fetch_image(
    client: &reqwest::Client,
    image_url: &str,
    dest: &Path,
) -> MediaResult<u64> {
    if !(image_url.starts_with("https://") || image_url.starts_with("http://")) {
        return Err(MediaError::download_failed(format!(
            "Unsupported thumbnail URL: {}",
            image_url
        )));
    }

    let mut response = client
        .get(image_url)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .map_err(http_error)?;
    if !response.status().is_success() {
        return Err(MediaError::download_failed(format!(
            "Thumbnail host returned {}",
            response.status()
        )));
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(dest).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await.map_err(http_error)? {
        written += chunk.len() as u64;
        if written > MAX_THUMBNAIL_BYTES {
            drop(file);
            remove_file_if_exists(dest).await?;
            return Err(MediaError::download_failed(format!(
                "Thumbnail larger than {} bytes",
                MAX_THUMBNAIL_BYTES
            )));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    if written == 0 {
        return Err(MediaError::EmptyOutput(dest.to_path_buf()));
    }
    debug!(bytes = written, "Fetched thumbnail {}", image_url);
    Ok(written)
}

fn http_error(e: reqwest::Error) -> MediaError {
    if e.is_timeout() {
        MediaError::Timeout(FETCH_TIMEOUT.as_secs())
    } else {
        MediaError::download_failed(format!("Thumbnail fetch failed: {}", e))
    }
}

/// Let yt-dlp write the video's thumbnail into `dest_dir` as JPEG.
pub async fn write_thumbnail(
    url: &str,
    dest_dir: &Path,
    timeout_secs: u64,
) -> MediaResult<PathBuf> {
    tokio::fs::create_dir_all(dest_dir).await?;
    let template = dest_dir.join(THUMBNAIL_STEM);

    let args = vec![
        "--skip-download".to_string(),
        "--write-thumbnail".to_string(),
        "--convert-thumbnails".to_string(),
        "jpg".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "-o".to_string(),
        template.to_string_lossy().to_string(),
        url.to_string(),
    ];
    run_ytdlp(args, timeout_secs).await?;

    let path = find_thumbnail(dest_dir)
        .await?
        .ok_or_else(|| MediaError::download_failed("yt-dlp wrote no thumbnail"))?;
    info!("yt-dlp wrote thumbnail {}", path.display());
    Ok(path)
}

/// First thumbnail file in `dir`, preferring JPEG when conversion
/// left more than one.
async fn find_thumbnail(dir: &Path) -> MediaResult<Option<PathBuf>> {
    let mut found: Vec<(usize, PathBuf)> = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.file_stem().and_then(|s| s.to_str()) != Some(THUMBNAIL_STEM) {
            continue;
        }
        let rank = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .and_then(|ext| IMAGE_EXTENSIONS.iter().position(|known| *known == ext));
        if let Some(rank) = rank {
            found.push((rank, path));
        }
    }
    found.sort();
    Ok(found.into_iter().next().map(|(_, path)| path))
}
