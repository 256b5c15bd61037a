//! Artifact references and deterministic artifact naming.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::JobId;
use crate::kind::MediaKind;
use crate::utils::sanitize_filename_title;

const FILE_PREFIX: &str = "clip_cut_";

/// Structured address of one segment's output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactRef {
    pub job_id: JobId,
    /// 1-based segment ordinal
    pub ordinal: u32,
    pub kind: MediaKind,
}

impl ArtifactRef {
    pub fn new(job_id: JobId, ordinal: u32, kind: MediaKind) -> Self {
        Self {
            job_id,
            ordinal,
            kind,
        }
    }

    /// Stored file name: `clip_cut_<ordinal>_<job_id>.<ext>`.
    ///
    /// Contains `_cut_<ordinal>_`, so clients matching on that substring
    /// find exactly one file per ordinal.
    pub fn filename(&self) -> String {
        format!(
            "{}{}_{}.{}",
            FILE_PREFIX,
            self.ordinal,
            self.job_id,
            self.kind.extension()
        )
    }

    /// Parse a stored file name back into a reference.
    pub fn parse_filename(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(FILE_PREFIX)?;
        let (ordinal, rest) = rest.split_once('_')?;
        let (job_id, ext) = rest.rsplit_once('.')?;

        let ordinal: u32 = ordinal.parse().ok().filter(|n| *n > 0)?;
        let job_id = JobId::parse(job_id)?;
        let kind = match ext {
            "mp4" => MediaKind::Video,
            "mp3" => MediaKind::Audio,
            _ => return None,
        };

        Some(Self::new(job_id, ordinal, kind))
    }

    /// Friendly download name, e.g. `my_talk_cut_2.mp4`.
    pub fn download_name(&self, title: Option<&str>) -> String {
        let stem = title
            .map(sanitize_filename_title)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "clip".to_string());
        format!("{}_cut_{}.{}", stem, self.ordinal, self.kind.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_embeds_ordinal_and_job() {
        let job_id = JobId::new();
        let artifact = ArtifactRef::new(job_id.clone(), 3, MediaKind::Video);
        let name = artifact.filename();

        assert!(name.contains("_cut_3_"));
        assert!(name.contains(job_id.as_str()));
        assert!(name.ends_with(".mp4"));
        assert_eq!(ArtifactRef::parse_filename(&name), Some(artifact));
    }

    #[test]
    fn test_ordinals_do_not_alias() {
        let job_id = JobId::new();
        let one = ArtifactRef::new(job_id.clone(), 1, MediaKind::Audio).filename();
        let eleven = ArtifactRef::new(job_id, 11, MediaKind::Audio).filename();
        assert!(!eleven.contains("_cut_1_"));
        assert!(!one.contains("_cut_11_"));
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        assert!(ArtifactRef::parse_filename("video.mp4").is_none());
        assert!(ArtifactRef::parse_filename("clip_cut_0_x.mp4").is_none());
        assert!(ArtifactRef::parse_filename("clip_cut_1_not-a-uuid.mp4").is_none());
        let name = ArtifactRef::new(JobId::new(), 1, MediaKind::Video).filename();
        assert!(ArtifactRef::parse_filename(&name.replace(".mp4", ".exe")).is_none());
    }

    #[test]
    fn test_download_name() {
        let artifact = ArtifactRef::new(JobId::new(), 2, MediaKind::Audio);
        assert_eq!(artifact.download_name(Some("My Great Talk!")), "my_great_talk_cut_2.mp3");
        assert_eq!(artifact.download_name(None), "clip_cut_2.mp3");
        assert_eq!(artifact.download_name(Some("???")), "clip_cut_2.mp3");
    }
}
