//! Media kinds and quality hints.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of media: requested output kind, or the claimed kind of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    Video,
    Audio,
}

impl MediaKind {
    /// Parse a client-supplied kind (`"video"` / `"audio"`, case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Some(MediaKind::Video),
            "audio" => Some(MediaKind::Audio),
            _ => None,
        }
    }

    /// Guess the kind from a MIME type such as `video/mp4`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let top = mime.split('/').next()?.trim().to_ascii_lowercase();
        match top.as_str() {
            "video" => Some(MediaKind::Video),
            "audio" => Some(MediaKind::Audio),
            _ => None,
        }
    }

    /// Guess the kind from a file name's extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "mp4" | "m4v" | "mov" | "mkv" | "webm" | "avi" | "ts" | "flv" | "mpg" | "mpeg" => {
                Some(MediaKind::Video)
            }
            "mp3" | "m4a" | "aac" | "wav" | "flac" | "ogg" | "oga" | "opus" => Some(MediaKind::Audio),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }

    /// File extension of artifacts produced for this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Video => "mp4",
            MediaKind::Audio => "mp3",
        }
    }

    /// Content type of artifacts produced for this kind.
    pub fn content_type(&self) -> &'static str {
        match self {
            MediaKind::Video => "video/mp4",
            MediaKind::Audio => "audio/mpeg",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a whole-source download returns: the media itself, or only the
/// video's thumbnail image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadFormat {
    Media(MediaKind),
    Thumbnail,
}

impl DownloadFormat {
    /// Parse a client-supplied format (`"video"`, `"audio"` or `"thumbnail"`).
    pub fn parse(s: &str) -> Option<Self> {
        if s.trim().eq_ignore_ascii_case("thumbnail") {
            return Some(DownloadFormat::Thumbnail);
        }
        MediaKind::parse(s).map(DownloadFormat::Media)
    }
}

/// Video heights offered for remote downloads.
pub const VIDEO_HEIGHTS: [u32; 6] = [2160, 1440, 1080, 720, 480, 360];
/// Height used when no (or an unknown) hint is given.
pub const DEFAULT_VIDEO_HEIGHT: u32 = 1080;
/// MP3 bitrate used when no (or an out of range) hint is given.
pub const DEFAULT_AUDIO_KBPS: u32 = 192;

/// Client quality hint.
///
/// For video it selects the maximum download height; for audio it is the
/// MP3 bitrate in kbps. Values like `"720"`, `"720p"` and `"192k"` parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(transparent)]
pub struct QualityHint(Option<u32>);

impl QualityHint {
    pub fn parse(s: &str) -> Self {
        let digits = s
            .trim()
            .trim_end_matches(|c: char| c == 'p' || c == 'P' || c == 'k' || c == 'K');
        Self(digits.parse().ok())
    }

    pub fn value(&self) -> Option<u32> {
        self.0
    }

    /// Maximum video height to request.
    pub fn video_height(&self) -> u32 {
        self.0
            .filter(|h| VIDEO_HEIGHTS.contains(h))
            .unwrap_or(DEFAULT_VIDEO_HEIGHT)
    }

    /// yt-dlp format selector for a download of the given kind.
    pub fn format_selector(&self, kind: MediaKind) -> String {
        match kind {
            MediaKind::Video => {
                let h = self.video_height();
                format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]")
            }
            MediaKind::Audio => "bestaudio/best".to_string(),
        }
    }

    /// MP3 bitrate in kbps.
    pub fn audio_kbps(&self) -> u32 {
        self.0
            .filter(|k| (64..=320).contains(k))
            .unwrap_or(DEFAULT_AUDIO_KBPS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_format() {
        assert_eq!(DownloadFormat::parse("audio"), Some(DownloadFormat::Media(MediaKind::Audio)));
        assert_eq!(DownloadFormat::parse(" Thumbnail "), Some(DownloadFormat::Thumbnail));
        assert_eq!(DownloadFormat::parse("gif"), None);
    }

    #[test]
    fn test_media_kind_parse() {
        assert_eq!(MediaKind::parse("video"), Some(MediaKind::Video));
        assert_eq!(MediaKind::parse(" AUDIO "), Some(MediaKind::Audio));
        assert_eq!(MediaKind::parse("thumbnail"), None);
    }

    #[test]
    fn test_media_kind_guessing() {
        assert_eq!(MediaKind::from_mime("video/webm"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_mime("audio/mpeg"), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_mime("application/octet-stream"), None);
        assert_eq!(MediaKind::from_file_name("talk.MKV"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_file_name("song.flac"), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_file_name("README"), None);
    }

    #[test]
    fn test_artifact_naming_parts() {
        assert_eq!(MediaKind::Video.extension(), "mp4");
        assert_eq!(MediaKind::Audio.content_type(), "audio/mpeg");
    }

    #[test]
    fn test_quality_selector() {
        assert_eq!(
            QualityHint::parse("720p").format_selector(MediaKind::Video),
            "bestvideo[height<=720]+bestaudio/best[height<=720]"
        );
        // Unknown heights fall back to 1080.
        assert_eq!(QualityHint::parse("999").video_height(), 1080);
        assert_eq!(QualityHint::default().video_height(), 1080);
        assert_eq!(QualityHint::parse("2160").format_selector(MediaKind::Audio), "bestaudio/best");
    }

    #[test]
    fn test_quality_audio_bitrate() {
        assert_eq!(QualityHint::parse("320k").audio_kbps(), 320);
        assert_eq!(QualityHint::parse("1080").audio_kbps(), 192);
        assert_eq!(QualityHint::parse("").audio_kbps(), 192);
    }
}
