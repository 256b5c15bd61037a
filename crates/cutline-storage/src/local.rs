//! Artifact store on the local filesystem.
//!
//! Layout under the root:
//!
//! ```text
//! <root>/<job_id>/clip_cut_<n>_<job_id>.<ext>     committed artifacts
//! <root>/<job_id>/.staging/...                    in-progress extractions
//! ```
//!
//! Staging lives inside the job directory so a commit is a same-filesystem
//! rename and an artifact is never visible half-written.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

use cutline_models::{ArtifactRef, JobId};

use crate::error::{StorageError, StorageResult};
use crate::range::{resolve_range, RangeOutcome};

const STAGING_DIR: &str = ".staging";

/// An opened artifact positioned at the start of the served range.
#[derive(Debug)]
pub struct ArtifactRead {
    /// Reader limited to the served byte count
    pub reader: tokio::io::Take<File>,
    /// Full object length
    pub total_len: u64,
    /// Range that is being served (`Full` or `Partial`)
    pub range: RangeOutcome,
}

impl ArtifactRead {
    pub fn served_len(&self) -> u64 {
        self.range.served_len(self.total_len)
    }
}

/// Local artifact store.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `root` (created lazily).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every artifact of one job.
    pub fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.root.join(job_id.as_str())
    }

    /// Final location of an artifact.
    pub fn path_for(&self, artifact: &ArtifactRef) -> PathBuf {
        self.job_dir(&artifact.job_id).join(artifact.filename())
    }

    /// Location an extraction writes to before commit.
    pub fn staging_path(&self, artifact: &ArtifactRef) -> PathBuf {
        self.job_dir(&artifact.job_id)
            .join(STAGING_DIR)
            .join(artifact.filename())
    }

    /// Create the staging directory for a job.
    pub async fn prepare_job(&self, job_id: &JobId) -> StorageResult<()> {
        fs::create_dir_all(self.job_dir(job_id).join(STAGING_DIR)).await?;
        Ok(())
    }

    /// Atomically move a staged artifact into place.
    ///
    /// Empty or missing staged files are rejected and removed.
    pub async fn commit(&self, artifact: &ArtifactRef) -> StorageResult<PathBuf> {
        let staged = self.staging_path(artifact);
        let size = match fs::metadata(&staged).await {
            Ok(meta) => meta.len(),
            Err(_) => {
                return Err(StorageError::commit_failed(format!(
                    "staged file missing for {}",
                    artifact.filename()
                )))
            }
        };
        if size == 0 {
            self.discard(artifact).await;
            return Err(StorageError::commit_failed(format!(
                "staged file is empty for {}",
                artifact.filename()
            )));
        }

        let dest = self.path_for(artifact);
        fs::rename(&staged, &dest).await?;
        debug!(artifact = %artifact.filename(), size_bytes = size, "Committed artifact");
        Ok(dest)
    }

    /// Remove a staged file, if any.
    pub async fn discard(&self, artifact: &ArtifactRef) {
        let staged = self.staging_path(artifact);
        if let Err(e) = fs::remove_file(&staged).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %staged.display(), error = %e, "Failed to remove staged file");
            }
        }
    }

    /// Remove the staging directory once a job's segments are all recorded.
    pub async fn finish_job(&self, job_id: &JobId) {
        let staging = self.job_dir(job_id).join(STAGING_DIR);
        if let Err(e) = fs::remove_dir_all(&staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %staging.display(), error = %e, "Failed to remove staging directory");
            }
        }
    }

    /// Whether a committed artifact is present.
    pub async fn exists(&self, artifact: &ArtifactRef) -> bool {
        fs::metadata(self.path_for(artifact))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Open an artifact for reading, honouring an optional `Range` header.
    pub async fn open(
        &self,
        artifact: &ArtifactRef,
        range_header: Option<&str>,
    ) -> StorageResult<ArtifactRead> {
        let path = self.path_for(artifact);
        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(artifact.filename()))
            }
            Err(e) => return Err(e.into()),
        };
        let total_len = file.metadata().await?.len();

        let range = resolve_range(range_header, total_len);
        let start = match range {
            RangeOutcome::Unsatisfiable => {
                return Err(StorageError::RangeNotSatisfiable { len: total_len })
            }
            RangeOutcome::Partial { start, .. } => start,
            RangeOutcome::Full => 0,
        };
        if start > 0 {
            file.seek(SeekFrom::Start(start)).await?;
        }

        let served = range.served_len(total_len);
        Ok(ArtifactRead {
            reader: file.take(served),
            total_len,
            range,
        })
    }

    /// Delete every artifact of a job.
    pub async fn remove_job(&self, job_id: &JobId) -> StorageResult<()> {
        match fs::remove_dir_all(self.job_dir(job_id)).await {
            Ok(()) => {
                info!(job_id = %job_id, "Removed job artifacts");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete everything under the root.
    pub async fn purge_all(&self) -> StorageResult<()> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutline_models::MediaKind;
    use tempfile::TempDir;

    async fn staged(store: &ArtifactStore, ordinal: u32, bytes: &[u8]) -> ArtifactRef {
        let job_id = JobId::new();
        let artifact = ArtifactRef::new(job_id.clone(), ordinal, MediaKind::Video);
        store.prepare_job(&job_id).await.unwrap();
        fs::write(store.staging_path(&artifact), bytes).await.unwrap();
        artifact
    }

    #[tokio::test]
    async fn test_commit_moves_staged_file() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = staged(&store, 1, b"0123456789").await;

        assert!(!store.exists(&artifact).await);
        let path = store.commit(&artifact).await.unwrap();
        assert!(path.ends_with(artifact.filename()));
        assert!(store.exists(&artifact).await);
        assert!(!store.staging_path(&artifact).exists());
    }

    #[tokio::test]
    async fn test_commit_rejects_empty_output() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = staged(&store, 2, b"").await;

        assert!(matches!(
            store.commit(&artifact).await,
            Err(StorageError::CommitFailed(_))
        ));
        assert!(!store.exists(&artifact).await);
        assert!(!store.staging_path(&artifact).exists());
    }

    #[tokio::test]
    async fn test_open_full_and_partial() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = staged(&store, 1, b"0123456789").await;
        store.commit(&artifact).await.unwrap();

        let mut full = store.open(&artifact, None).await.unwrap();
        let mut buf = Vec::new();
        full.reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"0123456789");
        assert_eq!(full.range, RangeOutcome::Full);

        let mut part = store.open(&artifact, Some("bytes=2-4")).await.unwrap();
        let mut buf = Vec::new();
        part.reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"234");
        assert_eq!(part.served_len(), 3);
        assert_eq!(part.total_len, 10);
    }

    #[tokio::test]
    async fn test_open_errors() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = staged(&store, 1, b"abc").await;

        assert!(matches!(
            store.open(&artifact, None).await,
            Err(StorageError::NotFound(_))
        ));

        store.commit(&artifact).await.unwrap();
        assert!(matches!(
            store.open(&artifact, Some("bytes=10-")).await,
            Err(StorageError::RangeNotSatisfiable { len: 3 })
        ));
    }

    #[tokio::test]
    async fn test_remove_job_and_purge() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("artifacts"));
        let artifact = staged(&store, 1, b"abc").await;
        store.commit(&artifact).await.unwrap();

        store.remove_job(&artifact.job_id).await.unwrap();
        assert!(!store.job_dir(&artifact.job_id).exists());
        store.remove_job(&artifact.job_id).await.unwrap();

        store.purge_all().await.unwrap();
        assert!(!store.root().exists());
    }
}
