//! Source resolution.
//!
//! Turns a remote URL or an uploaded file into a [`SourceHandle`] whose
//! media sits on local disk under `<work_dir>/sources/<source_id>/`.
//!
//! Remote sources are downloaded once per `(url, format selector)` and
//! shared by every job cut from them. Concurrent resolutions of the same
//! key wait on a single in-flight download.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, info, warn};

use cutline_media::{
    move_file, remove_dir_if_exists, remove_file_if_exists, sniff_container, MediaError,
    MediaInfo, MediaProber, RemoteMetadata, SourceFetcher, SNIFF_LEN,
};
use cutline_models::{
    validate_source_url, MediaKind, QualityHint, SourceHandle, SourceId, SourceOrigin,
};

use crate::config::WorkerConfig;
use crate::error::{SourceError, SourceResult};
use crate::retry::{retry_async, RetryConfig};

/// Cache key for remote sources: normalized URL and yt-dlp selector.
type RemoteKey = (String, String);

#[derive(Debug, Clone)]
struct SourceEntry {
    handle: SourceHandle,
    last_used: DateTime<Utc>,
    remote_key: Option<RemoteKey>,
}

/// What a client supplied as the source of a job.
#[derive(Debug, Clone)]
pub enum SourceDescriptor {
    /// A hosting-platform URL; `kind` and `quality` pick the download format.
    RemoteUrl {
        url: String,
        kind: MediaKind,
        quality: QualityHint,
    },
    /// Upload bytes held in memory.
    UploadBytes {
        bytes: Vec<u8>,
        claimed_kind: MediaKind,
        file_name: Option<String>,
    },
    /// Upload already streamed to a spool file (see
    /// [`SourceResolver::create_spool_file`]).
    UploadFile {
        path: PathBuf,
        claimed_kind: MediaKind,
        file_name: Option<String>,
    },
}

/// Resolves source descriptors into local, probed media.
pub struct SourceResolver {
    fetcher: Arc<dyn SourceFetcher>,
    prober: Arc<dyn MediaProber>,
    sources_dir: PathBuf,
    uploads_dir: PathBuf,
    download_timeout_secs: u64,
    retry: RetryConfig,
    handles: RwLock<HashMap<SourceId, SourceEntry>>,
    remote_cache: Mutex<HashMap<RemoteKey, Arc<OnceCell<SourceId>>>>,
}

impl SourceResolver {
    pub fn new(
        config: &WorkerConfig,
        fetcher: Arc<dyn SourceFetcher>,
        prober: Arc<dyn MediaProber>,
    ) -> Self {
        Self {
            fetcher,
            prober,
            sources_dir: config.sources_dir(),
            uploads_dir: config.uploads_dir(),
            download_timeout_secs: config.download_timeout.as_secs(),
            retry: RetryConfig::new("source_download"),
            handles: RwLock::new(HashMap::new()),
            remote_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Override the download retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Resolve any descriptor into a registered handle.
    pub async fn resolve(&self, descriptor: SourceDescriptor) -> SourceResult<SourceHandle> {
        match descriptor {
            SourceDescriptor::RemoteUrl { url, kind, quality } => {
                self.resolve_remote(&url, kind, quality).await
            }
            SourceDescriptor::UploadBytes {
                bytes,
                claimed_kind,
                file_name,
            } => {
                self.resolve_upload_bytes(&bytes, claimed_kind, file_name)
                    .await
            }
            SourceDescriptor::UploadFile {
                path,
                claimed_kind,
                file_name,
            } => {
                self.resolve_upload_file(&path, claimed_kind, file_name)
                    .await
            }
        }
    }

    /// Metadata of a remote source, without downloading it.
    pub async fn describe(&self, url: &str) -> SourceResult<RemoteMetadata> {
        let url = validate_source_url(url)?;
        self.fetch_metadata(url.as_str()).await
    }

    /// Resolve a remote URL, downloading it unless an earlier resolution
    /// with the same selector is still registered.
    pub async fn resolve_remote(
        &self,
        url: &str,
        kind: MediaKind,
        quality: QualityHint,
    ) -> SourceResult<SourceHandle> {
        let url = validate_source_url(url)?;
        let selector = quality.format_selector(kind);
        let key: RemoteKey = (url.to_string(), selector.clone());

        // A cached id can point at a source evicted by retention; in that
        // case the stale cell is dropped and the download runs again.
        for _ in 0..2 {
            let cell = {
                let mut cache = self.remote_cache.lock().await;
                Arc::clone(cache.entry(key.clone()).or_default())
            };

            if cell.initialized() {
                metrics::counter!("cutline_source_cache_hits_total").increment(1);
            }
            let id = cell
                .get_or_try_init(|| self.fetch_remote(url.as_str(), &selector, &key))
                .await?
                .clone();

            if let Some(handle) = self.get(&id).await {
                return Ok(handle);
            }

            let mut cache = self.remote_cache.lock().await;
            if cache.get(&key).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
                cache.remove(&key);
            }
        }

        Err(SourceError::unreachable("source was evicted while resolving"))
    }

    async fn fetch_metadata(&self, url: &str) -> SourceResult<RemoteMetadata> {
        retry_async(&self.retry, |e: &MediaError| !e.is_permanent(), || {
            self.fetcher.metadata(url)
        })
        .await
        .map_err(|e| SourceError::unreachable(e.detail()))
    }

    async fn fetch_remote(&self, url: &str, selector: &str, key: &RemoteKey) -> SourceResult<SourceId> {
        let metadata = self.fetch_metadata(url).await?;

        let id = SourceId::new();
        let dir = self.sources_dir.join(id.as_str());
        info!(source_id = %id, url = %url, title = %metadata.title, "Downloading remote source");

        let downloaded = retry_async(&self.retry, |e: &MediaError| !e.is_permanent(), || {
            self.fetcher
                .download(url, &dir, selector, self.download_timeout_secs)
        })
        .await;

        let path = match downloaded {
            Ok(path) => path,
            Err(e) => {
                cleanup_dir(&dir).await;
                metrics::counter!("cutline_sources_resolved_total", "origin" => "remote", "outcome" => "unreachable")
                    .increment(1);
                return Err(SourceError::unreachable(e.detail()));
            }
        };

        let info = match self.prober.probe(&path).await {
            Ok(info) => info,
            Err(e) => {
                cleanup_dir(&dir).await;
                metrics::counter!("cutline_sources_resolved_total", "origin" => "remote", "outcome" => "corrupt")
                    .increment(1);
                return Err(SourceError::corrupt(e.detail()));
            }
        };

        let handle = SourceHandle {
            id: id.clone(),
            origin: SourceOrigin::RemoteUrl {
                url: url.to_string(),
            },
            title: metadata.title.clone(),
            approximate_size_bytes: metadata.approximate_size.unwrap_or(info.size),
            duration_secs: info.duration.or(metadata.duration),
            has_video: info.has_video,
            has_audio: info.has_audio,
            local_path: path,
            resolved_at: Utc::now(),
        };
        self.register(handle, Some(key.clone())).await;
        metrics::counter!("cutline_sources_resolved_total", "origin" => "remote", "outcome" => "success")
            .increment(1);
        Ok(id)
    }

    /// Create an empty spool file for an incoming upload.
    pub async fn create_spool_file(&self) -> SourceResult<(PathBuf, tokio::fs::File)> {
        tokio::fs::create_dir_all(&self.uploads_dir).await?;
        let path = self
            .uploads_dir
            .join(format!("{}.part", SourceId::new()));
        let file = tokio::fs::File::create(&path).await?;
        Ok((path, file))
    }

    /// Resolve an in-memory upload.
    pub async fn resolve_upload_bytes(
        &self,
        bytes: &[u8],
        claimed_kind: MediaKind,
        file_name: Option<String>,
    ) -> SourceResult<SourceHandle> {
        if bytes.is_empty() {
            return Err(SourceError::EmptyUpload);
        }
        let (path, _file) = self.create_spool_file().await?;
        tokio::fs::write(&path, bytes).await?;
        self.resolve_upload_file(&path, claimed_kind, file_name).await
    }

    /// Resolve an upload already spooled to disk.
    ///
    /// The spool file is consumed: it is moved into the source directory on
    /// success and deleted on failure.
    pub async fn resolve_upload_file(
        &self,
        spooled: &Path,
        claimed_kind: MediaKind,
        file_name: Option<String>,
    ) -> SourceResult<SourceHandle> {
        let result = self
            .resolve_spooled(spooled, claimed_kind, file_name)
            .await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(SourceError::EmptyUpload) => "empty",
            Err(SourceError::NotMedia(_)) => "not_media",
            Err(_) => "corrupt",
        };
        metrics::counter!("cutline_sources_resolved_total", "origin" => "upload", "outcome" => outcome)
            .increment(1);
        if result.is_err() {
            if let Err(e) = remove_file_if_exists(spooled).await {
                warn!(path = %spooled.display(), "Failed to remove rejected upload: {}", e);
            }
        }
        result
    }

    async fn resolve_spooled(
        &self,
        spooled: &Path,
        claimed_kind: MediaKind,
        file_name: Option<String>,
    ) -> SourceResult<SourceHandle> {
        let size = tokio::fs::metadata(spooled).await?.len();
        if size == 0 {
            return Err(SourceError::EmptyUpload);
        }

        let mut head = Vec::with_capacity(SNIFF_LEN);
        tokio::fs::File::open(spooled)
            .await?
            .take(SNIFF_LEN as u64)
            .read_to_end(&mut head)
            .await?;
        match sniff_container(&head) {
            Some(container) if container.plausible_for(claimed_kind) => {
                debug!(container = ?container, kind = %claimed_kind, "Upload container recognized");
            }
            _ => return Err(SourceError::NotMedia(claimed_kind)),
        }

        let id = SourceId::new();
        let dir = self.sources_dir.join(id.as_str());
        let dest = dir.join(format!("upload.{}", upload_extension(file_name.as_deref(), claimed_kind)));
        move_file(spooled, &dest)
            .await
            .map_err(|e| SourceError::corrupt(e.to_string()))?;

        let info = match self.probe_upload(&dest, claimed_kind).await {
            Ok(info) => info,
            Err(e) => {
                cleanup_dir(&dir).await;
                return Err(e);
            }
        };

        let title = file_name
            .as_deref()
            .map(|n| n.rsplit_once('.').map_or(n, |(stem, _)| stem).to_string())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "upload".to_string());

        let handle = SourceHandle {
            id,
            origin: SourceOrigin::UploadedFile { file_name },
            title,
            approximate_size_bytes: size,
            duration_secs: info.duration,
            has_video: info.has_video,
            has_audio: info.has_audio,
            local_path: dest,
            resolved_at: Utc::now(),
        };
        info!(source_id = %handle.id, size_bytes = size, "Resolved uploaded source");
        self.register(handle.clone(), None).await;
        Ok(handle)
    }

    async fn probe_upload(&self, path: &Path, claimed_kind: MediaKind) -> SourceResult<MediaInfo> {
        let info = self
            .prober
            .probe(path)
            .await
            .map_err(|e| SourceError::corrupt(e.detail()))?;
        let usable = match claimed_kind {
            MediaKind::Video => info.has_video,
            MediaKind::Audio => info.has_audio,
        };
        if !usable {
            return Err(SourceError::NotMedia(claimed_kind));
        }
        Ok(info)
    }

    async fn register(&self, handle: SourceHandle, remote_key: Option<RemoteKey>) {
        let mut handles = self.handles.write().await;
        handles.insert(
            handle.id.clone(),
            SourceEntry {
                handle,
                last_used: Utc::now(),
                remote_key,
            },
        );
        metrics::gauge!("cutline_sources_registered").set(handles.len() as f64);
    }

    /// Look up a registered handle, marking it as used.
    pub async fn get(&self, id: &SourceId) -> Option<SourceHandle> {
        let mut handles = self.handles.write().await;
        let entry = handles.get_mut(id)?;
        entry.last_used = Utc::now();
        Some(entry.handle.clone())
    }

    /// Sources not used since `cutoff`.
    pub async fn idle_since(&self, cutoff: DateTime<Utc>) -> Vec<SourceId> {
        self.handles
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.last_used < cutoff)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Unregister a source and delete its files.
    pub async fn evict(&self, id: &SourceId) -> bool {
        let entry = {
            let mut handles = self.handles.write().await;
            let entry = handles.remove(id);
            metrics::gauge!("cutline_sources_registered").set(handles.len() as f64);
            entry
        };
        let Some(entry) = entry else {
            return false;
        };

        if let Some(key) = &entry.remote_key {
            self.remote_cache.lock().await.remove(key);
        }
        cleanup_dir(&self.sources_dir.join(id.as_str())).await;
        info!(source_id = %id, title = %entry.handle.title, "Evicted source");
        true
    }

    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Extension for a stored upload: the client's, when it looks sane.
fn upload_extension(file_name: Option<&str>, kind: MediaKind) -> String {
    file_name
        .and_then(|n| n.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| kind.extension().to_string())
}

async fn cleanup_dir(dir: &Path) {
    if let Err(e) = remove_dir_if_exists(dir).await {
        warn!(path = %dir.display(), "Failed to remove source directory: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeFetcher, FakeProber, CORRUPT_MARKER, FAKE_MP4_HEAD};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tempfile::TempDir;

    const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    fn resolver(dir: &TempDir, fetcher: Arc<FakeFetcher>, prober: FakeProber) -> SourceResolver {
        let config = WorkerConfig::with_work_dir(dir.path());
        SourceResolver::new(&config, fetcher, Arc::new(prober))
            .with_retry(RetryConfig::new("test").with_base_delay(Duration::from_millis(1)))
    }

    fn mp4_bytes() -> Vec<u8> {
        let mut bytes = FAKE_MP4_HEAD.to_vec();
        bytes.extend_from_slice(&[0u8; 64]);
        bytes
    }

    #[tokio::test]
    async fn test_remote_resolution_populates_handle() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let resolver = resolver(&dir, fetcher.clone(), FakeProber::default());

        let handle = resolver
            .resolve_remote(URL, MediaKind::Video, QualityHint::parse("720"))
            .await
            .unwrap();

        assert_eq!(handle.title, "Sample Talk");
        assert_eq!(handle.approximate_size_bytes, 4096);
        assert_eq!(handle.duration_secs, Some(600.0));
        assert!(handle.local_path.starts_with(dir.path().join("sources")));
        assert!(handle.local_path.exists());
        assert_eq!(
            fetcher.last_selector.lock().unwrap().as_deref(),
            Some("bestvideo[height<=720]+bestaudio/best[height<=720]")
        );
    }

    #[tokio::test]
    async fn test_concurrent_resolutions_download_once() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher {
            download_delay: Duration::from_millis(50),
            ..FakeFetcher::default()
        });
        let resolver = Arc::new(resolver(&dir, fetcher.clone(), FakeProber::default()));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move {
                    resolver
                        .resolve_remote(URL, MediaKind::Video, QualityHint::default())
                        .await
                        .unwrap()
                        .id
                })
            })
            .collect();
        let ids: Vec<SourceId> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(fetcher.download_count(), 1);
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(resolver.len().await, 1);
    }

    #[tokio::test]
    async fn test_different_selectors_download_separately() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let resolver = resolver(&dir, fetcher.clone(), FakeProber::default());

        let video = resolver
            .resolve_remote(URL, MediaKind::Video, QualityHint::default())
            .await
            .unwrap();
        let audio = resolver
            .resolve_remote(URL, MediaKind::Audio, QualityHint::default())
            .await
            .unwrap();

        assert_ne!(video.id, audio.id);
        assert_eq!(fetcher.download_count(), 2);
    }

    #[tokio::test]
    async fn test_evicted_source_is_downloaded_again() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let resolver = resolver(&dir, fetcher.clone(), FakeProber::default());

        let first = resolver
            .resolve_remote(URL, MediaKind::Video, QualityHint::default())
            .await
            .unwrap();
        assert!(resolver.evict(&first.id).await);
        assert!(!first.local_path.exists());

        let second = resolver
            .resolve_remote(URL, MediaKind::Video, QualityHint::default())
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(fetcher.download_count(), 2);
    }

    #[tokio::test]
    async fn test_transient_download_failures_are_retried() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        fetcher.transient_failures.store(2, Ordering::SeqCst);
        let resolver = resolver(&dir, fetcher.clone(), FakeProber::default());

        assert!(resolver
            .resolve_remote(URL, MediaKind::Video, QualityHint::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unavailable_remote_is_unresolvable() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher {
            unavailable: true,
            ..FakeFetcher::default()
        });
        let resolver = resolver(&dir, fetcher, FakeProber::default());

        let err = resolver
            .resolve_remote(URL, MediaKind::Video, QualityHint::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Unreachable(_)));
        assert!(resolver.is_empty().await);
    }

    #[tokio::test]
    async fn test_unsupported_url_rejected_before_fetch() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let resolver = resolver(&dir, fetcher.clone(), FakeProber::default());

        let err = resolver
            .resolve_remote("http://127.0.0.1/admin", MediaKind::Video, QualityHint::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Rejected(_)));
        assert_eq!(fetcher.download_count(), 0);
        assert!(resolver.describe("https://example.com/v").await.is_err());
    }

    #[tokio::test]
    async fn test_upload_resolution() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir, Arc::new(FakeFetcher::default()), FakeProber::default());

        let handle = resolver
            .resolve_upload_bytes(&mp4_bytes(), MediaKind::Video, Some("My Clip.MP4".to_string()))
            .await
            .unwrap();

        assert_eq!(handle.title, "My Clip");
        assert_eq!(handle.approximate_size_bytes, mp4_bytes().len() as u64);
        assert!(handle.local_path.ends_with("upload.mp4"));
        assert!(resolver.get(&handle.id).await.is_some());
    }

    #[tokio::test]
    async fn test_bad_uploads_rejected() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(&dir, Arc::new(FakeFetcher::default()), FakeProber::default());

        assert!(matches!(
            resolver.resolve_upload_bytes(b"", MediaKind::Video, None).await,
            Err(SourceError::EmptyUpload)
        ));
        assert!(matches!(
            resolver
                .resolve_upload_bytes(b"<html>not a video</html>", MediaKind::Video, None)
                .await,
            Err(SourceError::NotMedia(MediaKind::Video))
        ));

        let mut corrupt = FAKE_MP4_HEAD.to_vec();
        corrupt.extend_from_slice(CORRUPT_MARKER);
        assert!(matches!(
            resolver.resolve_upload_bytes(&corrupt, MediaKind::Video, None).await,
            Err(SourceError::Corrupt(_))
        ));
        assert!(resolver.is_empty().await);

        let mut spooled = tokio::fs::read_dir(dir.path().join("uploads")).await.unwrap();
        assert!(spooled.next_entry().await.unwrap().is_none(), "rejected uploads are deleted");
    }

    #[tokio::test]
    async fn test_video_claim_needs_video_stream() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver(
            &dir,
            Arc::new(FakeFetcher::default()),
            FakeProber::audio_only(30.0),
        );

        assert!(matches!(
            resolver.resolve_upload_bytes(&mp4_bytes(), MediaKind::Video, None).await,
            Err(SourceError::NotMedia(MediaKind::Video))
        ));
        assert!(resolver
            .resolve_upload_bytes(&mp4_bytes(), MediaKind::Audio, None)
            .await
            .is_ok());
    }

    #[test]
    fn test_upload_extension() {
        assert_eq!(upload_extension(Some("a.MKV"), MediaKind::Video), "mkv");
        assert_eq!(upload_extension(Some("noext"), MediaKind::Audio), "mp3");
        assert_eq!(upload_extension(Some("x.../../sh"), MediaKind::Video), "mp4");
        assert_eq!(upload_extension(None, MediaKind::Video), "mp4");
    }
}
