//! Container detection from leading bytes.
//!
//! Uploads are checked here before anything is written to the source
//! cache; FFprobe then has the final word on whether the file decodes.

use cutline_models::MediaKind;

/// Bytes needed by [`sniff_container`] to recognise every format.
pub const SNIFF_LEN: usize = 512;

/// Container families recognised by their signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// MP4, MOV, M4A, 3GP
    IsoBmff,
    /// MKV, WebM, MKA
    Matroska,
    Avi,
    Wave,
    MpegTs,
    MpegPs,
    Flv,
    Ogg,
    Mp3,
    Flac,
    Adts,
}

impl Container {
    /// Whether the container can carry video at all.
    pub fn can_hold_video(&self) -> bool {
        !matches!(
            self,
            Container::Wave | Container::Mp3 | Container::Flac | Container::Adts
        )
    }

    /// Whether an upload claiming `kind` is plausible for this container.
    ///
    /// Audio can be taken from any media container; video needs a container
    /// able to carry a video stream.
    pub fn plausible_for(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Video => self.can_hold_video(),
            MediaKind::Audio => true,
        }
    }
}

/// Identify the container from the first bytes of a file.
pub fn sniff_container(head: &[u8]) -> Option<Container> {
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        return Some(Container::IsoBmff);
    }
    // QuickTime files without ftyp start with a moov/mdat/wide/free atom.
    if head.len() >= 8 && matches!(&head[4..8], b"moov" | b"mdat" | b"wide" | b"free") {
        return Some(Container::IsoBmff);
    }
    if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some(Container::Matroska);
    }
    if head.len() >= 12 && head.starts_with(b"RIFF") {
        return match &head[8..12] {
            b"AVI " => Some(Container::Avi),
            b"WAVE" => Some(Container::Wave),
            _ => None,
        };
    }
    if head.starts_with(b"FLV") {
        return Some(Container::Flv);
    }
    if head.starts_with(b"OggS") {
        return Some(Container::Ogg);
    }
    if head.starts_with(b"fLaC") {
        return Some(Container::Flac);
    }
    if head.starts_with(b"ID3") {
        return Some(Container::Mp3);
    }
    if head.starts_with(&[0x00, 0x00, 0x01, 0xBA]) {
        return Some(Container::MpegPs);
    }
    // MPEG-TS: sync byte at the start of two consecutive 188-byte packets.
    if head.len() > 188 && head[0] == 0x47 && head[188] == 0x47 {
        return Some(Container::MpegTs);
    }
    if head.len() >= 2 && head[0] == 0xFF {
        // ADTS: 12-bit sync, layer bits 00. MPEG audio: 11-bit sync, layer != 00.
        if head[1] & 0xF6 == 0xF0 {
            return Some(Container::Adts);
        }
        if head[1] & 0xE0 == 0xE0 && head[1] & 0x06 != 0 {
            return Some(Container::Mp3);
        }
    }
    None
}

/// Still-image formats served as thumbnails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Webp => "image/webp",
        }
    }
}

/// Identify a still image from its first bytes.
pub fn sniff_image(head: &[u8]) -> Option<ImageFormat> {
    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(ImageFormat::Jpeg);
    }
    if head.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some(ImageFormat::Png);
    }
    if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WEBP" {
        return Some(ImageFormat::Webp);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(prefix: &[u8]) -> Vec<u8> {
        let mut bytes = prefix.to_vec();
        bytes.resize(SNIFF_LEN, 0);
        bytes
    }

    #[test]
    fn test_common_signatures() {
        assert_eq!(
            sniff_container(&padded(b"\x00\x00\x00\x20ftypisom")),
            Some(Container::IsoBmff)
        );
        assert_eq!(
            sniff_container(&padded(&[0x1A, 0x45, 0xDF, 0xA3])),
            Some(Container::Matroska)
        );
        assert_eq!(sniff_container(&padded(b"RIFF\x00\x00\x00\x00WAVE")), Some(Container::Wave));
        assert_eq!(sniff_container(&padded(b"RIFF\x00\x00\x00\x00AVI ")), Some(Container::Avi));
        assert_eq!(sniff_container(&padded(b"ID3\x04")), Some(Container::Mp3));
        assert_eq!(sniff_container(&padded(&[0xFF, 0xFB, 0x90])), Some(Container::Mp3));
        assert_eq!(sniff_container(&padded(&[0xFF, 0xF1, 0x50])), Some(Container::Adts));
        assert_eq!(sniff_container(&padded(b"fLaC")), Some(Container::Flac));
        assert_eq!(sniff_container(&padded(b"OggS")), Some(Container::Ogg));
        let mut ts = padded(&[0x47, 0x40, 0x00]);
        ts[188] = 0x47;
        assert_eq!(sniff_container(&ts), Some(Container::MpegTs));
    }

    #[test]
    fn test_non_media_rejected() {
        assert_eq!(sniff_container(b"%PDF-1.7 ..."), None);
        assert_eq!(sniff_container(b"<html><body>"), None);
        assert_eq!(sniff_container(b"PK\x03\x04"), None);
        assert_eq!(sniff_container(b""), None);
        assert_eq!(sniff_container(&padded(b"GIF89a")), None);
        assert_eq!(sniff_container(b"RIFF\x00\x00\x00\x00WEBP"), None);
    }

    #[test]
    fn test_image_signatures() {
        assert_eq!(sniff_image(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]), Some(ImageFormat::Jpeg));
        assert_eq!(sniff_image(b"\x89PNG\r\n\x1a\n\x00\x00"), Some(ImageFormat::Png));
        assert_eq!(
            sniff_image(b"RIFF\x10\x00\x00\x00WEBPVP8 "),
            Some(ImageFormat::Webp)
        );
        assert_eq!(ImageFormat::Webp.content_type(), "image/webp");
        assert_eq!(sniff_image(b"<html>"), None);
        assert_eq!(sniff_image(b"RIFF\x00\x00\x00\x00WAVE"), None);
        // MP3 frame sync shares the leading 0xFF with JPEG.
        assert_eq!(sniff_image(&[0xFF, 0xFB, 0x90]), None);
    }

    #[test]
    fn test_plausibility_for_claimed_kind() {
        assert!(Container::IsoBmff.plausible_for(MediaKind::Video));
        assert!(Container::IsoBmff.plausible_for(MediaKind::Audio));
        assert!(!Container::Mp3.plausible_for(MediaKind::Video));
        assert!(Container::Flac.plausible_for(MediaKind::Audio));
    }
}
