//! Segment encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Video codec for video segments (H.264)
pub const VIDEO_CODEC: &str = "libx264";
/// Audio codec inside video segments
pub const VIDEO_AUDIO_CODEC: &str = "aac";
/// Codec for audio-only segments
pub const MP3_CODEC: &str = "libmp3lame";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "veryfast";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 23;
/// Default AAC bitrate inside video segments
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

/// Encoding settings for extracted segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// x264 preset (e.g., "veryfast", "medium")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant Rate Factor (0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// AAC bitrate for the audio track of video segments
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
}

fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            preset: default_preset(),
            crf: DEFAULT_CRF,
            audio_bitrate: default_audio_bitrate(),
        }
    }
}

impl EncodingConfig {
    /// Returns a new config with updated CRF (clamped to 51).
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf.min(51);
        self
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    /// FFmpeg output arguments for an mp4 video segment.
    pub fn video_args(&self) -> Vec<String> {
        [
            "-c:v",
            VIDEO_CODEC,
            "-preset",
            &self.preset,
            "-crf",
            &self.crf.to_string(),
            "-c:a",
            VIDEO_AUDIO_CODEC,
            "-b:a",
            &self.audio_bitrate,
            "-movflags",
            "+faststart",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// FFmpeg output arguments for an mp3 audio segment.
    pub fn audio_args(&self, kbps: u32) -> Vec<String> {
        vec![
            "-vn".to_string(),
            "-c:a".to_string(),
            MP3_CODEC.to_string(),
            "-b:a".to_string(),
            format!("{kbps}k"),
        ]
    }
}
