//! FFmpeg, FFprobe and yt-dlp wrappers for segment extraction.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a timeout-aware tool runner
//! - Segment extraction (re-encoded video or MP3 audio)
//! - Media probing and container sniffing
//! - Remote metadata, download and search through yt-dlp
//! - Thumbnail retrieval over HTTP with a yt-dlp fallback
//! - Trait seams (`SegmentExtractor`, `MediaProber`, `SourceFetcher`) so
//!   callers can swap the real tools for fakes

pub mod clip;
pub mod command;
pub mod core;
pub mod download;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod sniff;
pub mod thumbnail;

pub use clip::{extract_segment, FfmpegExtractor};
pub use command::{check_ffmpeg, check_ffprobe, check_ytdlp, FfmpegCommand, FfmpegRunner};
pub use core::{ExtractRequest, MediaProber, SegmentExtractor, SourceFetcher};
pub use download::{
    classify_failure, download_media, fetch_metadata, search_videos, RemoteMetadata,
    ThumbnailCandidate, YtDlpFetcher,
};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{move_file, remove_dir_if_exists, remove_file_if_exists};
pub use probe::{probe_media, FfprobeProber, MediaInfo};
pub use sniff::{sniff_container, sniff_image, Container, ImageFormat, SNIFF_LEN};
pub use thumbnail::{fetch_image, write_thumbnail, MAX_THUMBNAIL_BYTES};
