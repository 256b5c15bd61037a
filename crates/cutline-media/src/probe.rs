//! FFprobe media information.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::command::{check_ffprobe, run_tool, stderr_tail};
use crate::core::MediaProber;
use crate::error::{MediaError, MediaResult};

/// Probe timeout; a well-formed file answers in well under a second.
const PROBE_TIMEOUT_SECS: u64 = 60;

/// Media file information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds; `None` when the container reports none
    pub duration: Option<f64>,
    /// File size in bytes
    pub size: u64,
    pub has_video: bool,
    pub has_audio: bool,
    /// Width in pixels (0 without video)
    pub width: u32,
    /// Height in pixels (0 without video)
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Codec of the first video stream, else of the first audio stream
    pub codec: String,
    /// Container format name(s) as reported by FFprobe
    pub format_name: String,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    #[serde(default)]
    disposition: Option<FfprobeDisposition>,
}

#[derive(Debug, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    attached_pic: u8,
}

/// Probe a media file.
///
/// Files FFprobe cannot read, or that carry neither audio nor video, are
/// [`MediaError::InvalidMedia`].
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
        path.to_string_lossy().to_string(),
    ];
    let output = run_tool(
        "ffprobe",
        &args,
        Some(std::time::Duration::from_secs(PROBE_TIMEOUT_SECS)),
    )
    .await?;

    if !output.status.success() {
        let stderr = stderr_tail(&output.stderr);
        return Err(MediaError::InvalidMedia(if stderr.is_empty() {
            "FFprobe could not read the file".to_string()
        } else {
            stderr
        }));
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    let info = media_info_from(probe);

    if !info.has_video && !info.has_audio {
        return Err(MediaError::InvalidMedia(
            "No audio or video stream found".to_string(),
        ));
    }

    Ok(info)
}

fn media_info_from(probe: FfprobeOutput) -> MediaInfo {
    // Cover art shows up as a video stream; it is not playable video.
    let video = probe.streams.iter().find(|s| {
        s.codec_type.as_deref() == Some("video")
            && s.disposition.as_ref().map_or(true, |d| d.attached_pic == 0)
    });
    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    let format = probe.format.as_ref();
    let duration = format
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);
    let size = format
        .and_then(|f| f.size.as_deref())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let fps = video
        .and_then(|v| v.avg_frame_rate.as_deref().or(v.r_frame_rate.as_deref()))
        .and_then(parse_frame_rate)
        .unwrap_or(0.0);

    MediaInfo {
        duration,
        size,
        has_video: video.is_some(),
        has_audio: audio.is_some(),
        width: video.and_then(|v| v.width).unwrap_or(0),
        height: video.and_then(|v| v.height).unwrap_or(0),
        fps,
        codec: video
            .or(audio)
            .and_then(|s| s.codec_name.clone())
            .unwrap_or_default(),
        format_name: format
            .and_then(|f| f.format_name.clone())
            .unwrap_or_default(),
    }
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}

/// [`MediaProber`] backed by the `ffprobe` binary.
#[derive(Debug, Default, Clone)]
pub struct FfprobeProber;

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
        probe_media(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    fn parse(json: &str) -> MediaInfo {
        media_info_from(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_video_with_audio() {
        let info = parse(
            r#"{
                "format": {"duration": "600.040000", "size": "1048576", "format_name": "mov,mp4,m4a,3gp,3g2,mj2"},
                "streams": [
                    {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080, "avg_frame_rate": "30/1"},
                    {"codec_type": "audio", "codec_name": "aac"}
                ]
            }"#,
        );
        assert_eq!(info.duration, Some(600.04));
        assert!(info.has_video && info.has_audio);
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.codec, "h264");
        assert_eq!(info.size, 1_048_576);
    }

    #[test]
    fn test_mp3_with_cover_art_is_audio_only() {
        let info = parse(
            r#"{
                "format": {"duration": "180.5"},
                "streams": [
                    {"codec_type": "audio", "codec_name": "mp3"},
                    {"codec_type": "video", "codec_name": "mjpeg", "disposition": {"attached_pic": 1}}
                ]
            }"#,
        );
        assert!(!info.has_video);
        assert!(info.has_audio);
        assert_eq!(info.codec, "mp3");
    }

    #[test]
    fn test_missing_duration() {
        let info = parse(r#"{"format": {"duration": "N/A"}, "streams": [{"codec_type": "audio"}]}"#);
        assert_eq!(info.duration, None);
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let result = probe_media("/nonexistent/input.mp4").await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
