//! In-process fakes of the media tool traits.
//!
//! They write real files so the resolver, scheduler and artifact store can
//! be exercised end to end without FFmpeg or yt-dlp installed.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use cutline_media::{
    ExtractRequest, MediaError, MediaInfo, MediaProber, MediaResult, RemoteMetadata,
    SegmentExtractor, SourceFetcher,
};
use cutline_models::SearchResult;

/// Leading bytes of a minimal ISO-BMFF file.
pub const FAKE_MP4_HEAD: &[u8] = b"\x00\x00\x00\x18ftypisom\x00\x00\x02\x00isomiso2";

/// Leading bytes of a JPEG image.
pub const FAKE_JPEG_HEAD: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

/// Marker that makes [`FakeProber`] reject a file.
pub const CORRUPT_MARKER: &[u8] = b"corrupt";

/// Fake yt-dlp.
#[derive(Debug)]
pub struct FakeFetcher {
    pub metadata: RemoteMetadata,
    /// Transient failures to return before downloads succeed
    pub transient_failures: AtomicUsize,
    /// Every download fails with an "unavailable" error
    pub unavailable: bool,
    pub download_delay: Duration,
    pub downloads: AtomicUsize,
    pub search_results: Vec<SearchResult>,
    pub last_selector: Mutex<Option<String>>,
    /// Direct image fetches fail, forcing the yt-dlp thumbnail path
    pub fail_image_fetch: bool,
    pub last_image_url: Mutex<Option<String>>,
    pub thumbnail_writes: AtomicUsize,
}

impl Default for FakeFetcher {
    fn default() -> Self {
        Self {
            metadata: RemoteMetadata {
                id: "dQw4w9WgXcQ".to_string(),
                title: "Sample Talk".to_string(),
                duration: Some(600.0),
                approximate_size: Some(4096),
                thumbnail: None,
                thumbnails: Vec::new(),
            },
            transient_failures: AtomicUsize::new(0),
            unavailable: false,
            download_delay: Duration::ZERO,
            downloads: AtomicUsize::new(0),
            search_results: Vec::new(),
            last_selector: Mutex::new(None),
            fail_image_fetch: false,
            last_image_url: Mutex::new(None),
            thumbnail_writes: AtomicUsize::new(0),
        }
    }
}

impl FakeFetcher {
    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn thumbnail_write_count(&self) -> usize {
        self.thumbnail_writes.load(Ordering::SeqCst)
    }

    pub fn fetched_image_url(&self) -> Option<String> {
        self.last_image_url.lock().ok().and_then(|last| last.clone())
    }
}

fn fake_jpeg() -> Vec<u8> {
    let mut body = FAKE_JPEG_HEAD.to_vec();
    body.extend_from_slice(&[0u8; 64]);
    body
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn metadata(&self, _url: &str) -> MediaResult<RemoteMetadata> {
        if self.unavailable {
            return Err(MediaError::unavailable("Video unavailable"));
        }
        Ok(self.metadata.clone())
    }

    async fn download(
        &self,
        _url: &str,
        dest_dir: &Path,
        selector: &str,
        _timeout_secs: u64,
    ) -> MediaResult<PathBuf> {
        if let Ok(mut last) = self.last_selector.lock() {
            *last = Some(selector.to_string());
        }
        if self.unavailable {
            return Err(MediaError::unavailable("Private video"));
        }
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(MediaError::download_failed("HTTP Error 503"));
        }

        if !self.download_delay.is_zero() {
            tokio::time::sleep(self.download_delay).await;
        }
        self.downloads.fetch_add(1, Ordering::SeqCst);

        tokio::fs::create_dir_all(dest_dir).await?;
        let path = dest_dir.join("source.mp4");
        let mut body = FAKE_MP4_HEAD.to_vec();
        body.extend_from_slice(&[0u8; 256]);
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }

    async fn search(&self, _query: &str, limit: usize) -> MediaResult<Vec<SearchResult>> {
        Ok(self.search_results.iter().take(limit).cloned().collect())
    }

    async fn fetch_image(&self, image_url: &str, dest: &Path) -> MediaResult<u64> {
        if let Ok(mut last) = self.last_image_url.lock() {
            *last = Some(image_url.to_string());
        }
        if self.fail_image_fetch {
            return Err(MediaError::download_failed("Thumbnail host returned 404 Not Found"));
        }
        let body = fake_jpeg();
        tokio::fs::write(dest, &body).await?;
        Ok(body.len() as u64)
    }

    async fn write_thumbnail(
        &self,
        _url: &str,
        dest_dir: &Path,
        _timeout_secs: u64,
    ) -> MediaResult<PathBuf> {
        if self.unavailable {
            return Err(MediaError::unavailable("Video unavailable"));
        }
        self.thumbnail_writes.fetch_add(1, Ordering::SeqCst);
        tokio::fs::create_dir_all(dest_dir).await?;
        let path = dest_dir.join("thumbnail.jpg");
        tokio::fs::write(&path, fake_jpeg()).await?;
        Ok(path)
    }
}

/// Fake ffprobe reporting fixed stream information.
#[derive(Debug, Clone)]
pub struct FakeProber {
    pub duration: Option<f64>,
    pub has_video: bool,
    pub has_audio: bool,
}

impl Default for FakeProber {
    fn default() -> Self {
        Self {
            duration: Some(600.0),
            has_video: true,
            has_audio: true,
        }
    }
}

impl FakeProber {
    pub fn audio_only(duration: f64) -> Self {
        Self {
            duration: Some(duration),
            has_video: false,
            has_audio: true,
        }
    }
}

#[async_trait]
impl MediaProber for FakeProber {
    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|_| MediaError::FileNotFound(path.to_path_buf()))?;
        if bytes.windows(CORRUPT_MARKER.len()).any(|w| w == CORRUPT_MARKER) {
            return Err(MediaError::InvalidMedia("moov atom not found".to_string()));
        }
        Ok(MediaInfo {
            duration: self.duration,
            size: bytes.len() as u64,
            has_video: self.has_video,
            has_audio: self.has_audio,
            ..MediaInfo::default()
        })
    }
}

/// Fake ffmpeg that writes a small file per segment.
#[derive(Debug, Default)]
pub struct FakeExtractor {
    /// Segments starting at these offsets fail
    pub fail_starts: Vec<f64>,
    pub delay: Duration,
    pub calls: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl FakeExtractor {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing_at(starts: Vec<f64>) -> Self {
        Self {
            fail_starts: starts,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SegmentExtractor for FakeExtractor {
    async fn extract(&self, request: &ExtractRequest) -> MediaResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let result = if self
            .fail_starts
            .iter()
            .any(|s| (s - request.start_secs).abs() < f64::EPSILON)
        {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with status 1",
                Some("Invalid data found when processing input".to_string()),
                Some(1),
            ))
        } else {
            let body = format!(
                "{} segment {:.3}+{:.3}",
                request.kind, request.start_secs, request.duration_secs
            );
            tokio::fs::write(&request.output, body).await.map_err(MediaError::from)
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
