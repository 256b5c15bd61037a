//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while probing, fetching or cutting media.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("yt-dlp not found in PATH")]
    YtDlpNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Download failed: {message}")]
    DownloadFailed { message: String },

    /// The remote reports the media does not exist or cannot be served.
    /// Retrying will not help.
    #[error("Media unavailable: {message}")]
    Unavailable { message: String },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid media file: {0}")]
    InvalidMedia(String),

    #[error("Output file is empty: {0}")]
    EmptyOutput(PathBuf),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a download failure error.
    pub fn download_failed(message: impl Into<String>) -> Self {
        Self::DownloadFailed {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Failures that will recur on retry.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            MediaError::Unavailable { .. }
                | MediaError::InvalidMedia(_)
                | MediaError::FfmpegNotFound
                | MediaError::FfprobeNotFound
                | MediaError::YtDlpNotFound
        )
    }

    /// Short, client-safe description including the tool's last stderr line.
    pub fn detail(&self) -> String {
        match self {
            MediaError::FfmpegFailed {
                message,
                stderr: Some(stderr),
                ..
            } => match stderr.lines().rev().find(|l| !l.trim().is_empty()) {
                Some(last) => format!("{}: {}", message, last.trim()),
                None => message.clone(),
            },
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_classification() {
        assert!(MediaError::unavailable("Video unavailable").is_permanent());
        assert!(!MediaError::download_failed("HTTP Error 503").is_permanent());
        assert!(!MediaError::Timeout(5).is_permanent());
    }

    #[test]
    fn test_detail_uses_last_stderr_line() {
        let err = MediaError::ffmpeg_failed(
            "FFmpeg exited with status 1",
            Some("frame=1\nInvalid data found when processing input\n\n".to_string()),
            Some(1),
        );
        assert_eq!(
            err.detail(),
            "FFmpeg exited with status 1: Invalid data found when processing input"
        );
    }
}
