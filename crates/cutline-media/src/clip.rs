//! Segment extraction.
//!
//! Every segment is re-encoded so cuts land exactly on the requested
//! timestamps rather than on the nearest keyframe:
//! - video: H.264 + AAC in mp4, `+faststart` for progressive playback
//! - audio: MP3 at the requested bitrate, video dropped

use async_trait::async_trait;
use std::time::Instant;
use tracing::info;

use cutline_models::{EncodingConfig, MediaKind};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::core::{ExtractRequest, SegmentExtractor};
use crate::error::{MediaError, MediaResult};

/// Build the FFmpeg command for one extraction.
pub fn build_extract_command(request: &ExtractRequest, encoding: &EncodingConfig) -> FfmpegCommand {
    let cmd = FfmpegCommand::new(&request.input, &request.output)
        .seek(request.start_secs)
        .duration(request.duration_secs);

    match request.kind {
        MediaKind::Video => cmd.output_args(encoding.video_args()),
        MediaKind::Audio => cmd
            .output_args(encoding.audio_args(request.audio_kbps))
            .output_args(["-f", "mp3"]),
    }
}

/// Extract one segment, re-encoding it for the requested kind.
pub async fn extract_segment(request: &ExtractRequest, encoding: &EncodingConfig) -> MediaResult<()> {
    info!(
        "Extracting segment: {} -> {} (start: {:.2}s, duration: {:.2}s, kind: {})",
        request.input.display(),
        request.output.display(),
        request.start_secs,
        request.duration_secs,
        request.kind
    );

    let started = Instant::now();
    let cmd = build_extract_command(request, encoding);
    FfmpegRunner::new()
        .with_timeout(request.timeout_secs)
        .run(&cmd)
        .await?;

    let size = match tokio::fs::metadata(&request.output).await {
        Ok(meta) => meta.len(),
        Err(_) => return Err(MediaError::EmptyOutput(request.output.clone())),
    };
    if size == 0 {
        return Err(MediaError::EmptyOutput(request.output.clone()));
    }

    info!(
        output = %request.output.display(),
        size_bytes = size,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Segment extracted"
    );
    Ok(())
}

/// [`SegmentExtractor`] backed by the `ffmpeg` binary.
#[derive(Debug, Clone, Default)]
pub struct FfmpegExtractor {
    encoding: EncodingConfig,
}

impl FfmpegExtractor {
    pub fn new(encoding: EncodingConfig) -> Self {
        Self { encoding }
    }
}

#[async_trait]
impl SegmentExtractor for FfmpegExtractor {
    async fn extract(&self, request: &ExtractRequest) -> MediaResult<()> {
        extract_segment(request, &self.encoding).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request(kind: MediaKind) -> ExtractRequest {
        ExtractRequest {
            input: PathBuf::from("/work/sources/abc/source.mp4"),
            output: PathBuf::from("/work/artifacts/job/.staging/clip_cut_1.mp4"),
            start_secs: 90.0,
            duration_secs: 30.0,
            kind,
            audio_kbps: 256,
            timeout_secs: 10,
        }
    }

    #[test]
    fn test_video_command() {
        let args = build_extract_command(&request(MediaKind::Video), &EncodingConfig::default())
            .build_args()
            .join(" ");
        assert!(args.contains("-ss 90.000 -t 30.000 -i /work/sources/abc/source.mp4"));
        assert!(args.contains("-c:v libx264"));
        assert!(args.contains("+faststart"));
        assert!(!args.contains("-vn"));
    }

    #[test]
    fn test_audio_command() {
        let args = build_extract_command(&request(MediaKind::Audio), &EncodingConfig::default())
            .build_args()
            .join(" ");
        assert!(args.contains("-vn -c:a libmp3lame -b:a 256k"));
        assert!(args.contains("-f mp3"));
        assert!(!args.contains("libx264"));
    }
}
