//! Cut points and their validation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kind::{DownloadFormat, MediaKind};
use crate::timestamp::{format_seconds, parse_timestamp, TimestampError};

/// Default upper bound on cut points in one job.
pub const DEFAULT_MAX_CUT_POINTS: usize = 50;

/// Slack allowed between a cut's end and the probed source duration.
pub const DURATION_TOLERANCE_SECS: f64 = 1.0;

/// A cut point as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawCutSpec {
    pub start: String,
    pub end: String,
}

impl RawCutSpec {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

/// A validated time range `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CutSpec {
    pub start_secs: f64,
    pub end_secs: f64,
}

impl CutSpec {
    /// Build a range; `None` unless `0 <= start < end` and both are finite.
    pub fn new(start_secs: f64, end_secs: f64) -> Option<Self> {
        let valid = start_secs.is_finite()
            && end_secs.is_finite()
            && start_secs >= 0.0
            && end_secs > start_secs;
        valid.then_some(Self {
            start_secs,
            end_secs,
        })
    }

    /// A range covering a whole source of the given duration.
    pub fn whole(duration_secs: f64) -> Option<Self> {
        Self::new(0.0, duration_secs)
    }

    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }

    /// Check the range against a known source duration.
    pub fn check_within(&self, source_duration_secs: f64) -> Result<(), String> {
        if self.end_secs > source_duration_secs + DURATION_TOLERANCE_SECS {
            return Err(format!(
                "End time ({:.1}s) exceeds source duration ({:.1}s)",
                self.end_secs, source_duration_secs
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for CutSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", format_seconds(self.start_secs), format_seconds(self.end_secs))
    }
}

/// Rejection of a cut list or output kind.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CutSpecError {
    #[error("At least one cut point is required")]
    Empty,

    #[error("Too many cut points ({count}); the maximum is {max}")]
    TooMany { count: usize, max: usize },

    #[error("Cut point {position}: invalid {field} time: {source}")]
    InvalidTime {
        position: usize,
        field: &'static str,
        source: TimestampError,
    },

    #[error("Cut point {position}: Start time must be before end time")]
    StartNotBeforeEnd { position: usize },

    #[error("Invalid format type")]
    InvalidOutputKind(String),

    #[error("Invalid cut points: {0}")]
    Malformed(String),
}

/// Parse a client-supplied output kind.
pub fn parse_output_kind(raw: &str) -> Result<MediaKind, CutSpecError> {
    MediaKind::parse(raw).ok_or_else(|| CutSpecError::InvalidOutputKind(raw.to_string()))
}

/// Parse a client-supplied whole-download format.
///
/// Unlike cut requests, whole downloads also accept `"thumbnail"`.
pub fn parse_download_format(raw: &str) -> Result<DownloadFormat, CutSpecError> {
    DownloadFormat::parse(raw).ok_or_else(|| CutSpecError::InvalidOutputKind(raw.to_string()))
}

/// Validate a cut list, preserving input order.
///
/// Ranges are not checked against the source duration here; the scheduler
/// fails individual segments that run past the end of the source.
pub fn validate_cut_specs(raw: &[RawCutSpec], max: usize) -> Result<Vec<CutSpec>, CutSpecError> {
    if raw.is_empty() {
        return Err(CutSpecError::Empty);
    }
    if raw.len() > max {
        return Err(CutSpecError::TooMany {
            count: raw.len(),
            max,
        });
    }

    raw.iter()
        .enumerate()
        .map(|(idx, cut)| {
            let position = idx + 1;
            let start = parse_timestamp(&cut.start).map_err(|source| CutSpecError::InvalidTime {
                position,
                field: "start",
                source,
            })?;
            let end = parse_timestamp(&cut.end).map_err(|source| CutSpecError::InvalidTime {
                position,
                field: "end",
                source,
            })?;
            CutSpec::new(start, end).ok_or(CutSpecError::StartNotBeforeEnd { position })
        })
        .collect()
}

/// Validate a cut list together with its requested output kind.
pub fn validate_request(
    raw: &[RawCutSpec],
    output_kind: &str,
    max: usize,
) -> Result<(Vec<CutSpec>, MediaKind), CutSpecError> {
    let kind = parse_output_kind(output_kind)?;
    let cuts = validate_cut_specs(raw, max)?;
    Ok((cuts, kind))
}

/// Parse the JSON-encoded `cutPoints` form field of an upload.
pub fn parse_cut_points_json(json: &str) -> Result<Vec<RawCutSpec>, CutSpecError> {
    serde_json::from_str(json).map_err(|e| CutSpecError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> Vec<RawCutSpec> {
        pairs.iter().map(|(s, e)| RawCutSpec::new(*s, *e)).collect()
    }

    #[test]
    fn test_validate_keeps_input_order() {
        let cuts = validate_cut_specs(
            &raw(&[("00:05:00", "00:06:00"), ("00:00:00", "00:01:00")]),
            DEFAULT_MAX_CUT_POINTS,
        )
        .unwrap();
        assert_eq!(cuts.len(), 2);
        assert_eq!(cuts[0].start_secs, 300.0);
        assert_eq!(cuts[1].start_secs, 0.0);
    }

    #[test]
    fn test_empty_list_rejected() {
        assert_eq!(validate_cut_specs(&[], DEFAULT_MAX_CUT_POINTS), Err(CutSpecError::Empty));
    }

    #[test]
    fn test_too_many_rejected() {
        let many = vec![RawCutSpec::new("0", "1"); 4];
        assert!(matches!(
            validate_cut_specs(&many, 3),
            Err(CutSpecError::TooMany { count: 4, max: 3 })
        ));
    }

    #[test]
    fn test_end_must_follow_start() {
        let err = validate_cut_specs(
            &raw(&[("00:00:00", "00:01:00"), ("00:02:00", "00:02:00")]),
            DEFAULT_MAX_CUT_POINTS,
        )
        .unwrap_err();
        assert_eq!(err, CutSpecError::StartNotBeforeEnd { position: 2 });
        assert_eq!(err.to_string(), "Cut point 2: Start time must be before end time");
    }

    #[test]
    fn test_bad_format_names_position_and_field() {
        let err = validate_cut_specs(&raw(&[("00:00:00", "later")]), DEFAULT_MAX_CUT_POINTS)
            .unwrap_err();
        assert!(matches!(
            err,
            CutSpecError::InvalidTime {
                position: 1,
                field: "end",
                ..
            }
        ));
    }

    #[test]
    fn test_ranges_not_clamped_at_validation() {
        // Past the end of any real source, but still a valid range.
        let cuts = validate_cut_specs(&raw(&[("00:59:00", "01:00:00")]), DEFAULT_MAX_CUT_POINTS)
            .unwrap();
        assert_eq!(cuts[0].end_secs, 3600.0);
        assert!(cuts[0].check_within(600.0).is_err());
    }

    #[test]
    fn test_check_within_tolerance() {
        let cut = CutSpec::new(0.0, 600.5).unwrap();
        assert!(cut.check_within(600.0).is_ok());
        let cut = CutSpec::new(0.0, 602.0).unwrap();
        assert!(cut.check_within(600.0).is_err());
    }

    #[test]
    fn test_output_kind() {
        assert_eq!(parse_output_kind("audio"), Ok(MediaKind::Audio));
        let err = parse_output_kind("thumbnail").unwrap_err();
        assert_eq!(err.to_string(), "Invalid format type");
    }

    #[test]
    fn test_download_format_accepts_thumbnail() {
        assert_eq!(parse_download_format("thumbnail"), Ok(DownloadFormat::Thumbnail));
        assert_eq!(
            parse_download_format("video"),
            Ok(DownloadFormat::Media(MediaKind::Video))
        );
        let err = parse_download_format("gif").unwrap_err();
        assert_eq!(err.to_string(), "Invalid format type");
    }

    #[test]
    fn test_validate_request_checks_kind_first() {
        let err = validate_request(&[], "gif", DEFAULT_MAX_CUT_POINTS).unwrap_err();
        assert!(matches!(err, CutSpecError::InvalidOutputKind(_)));
    }

    #[test]
    fn test_cut_points_json() {
        let parsed = parse_cut_points_json(r#"[{"start":"00:00:00","end":"00:01:00"}]"#).unwrap();
        assert_eq!(parsed, raw(&[("00:00:00", "00:01:00")]));
        assert!(matches!(parse_cut_points_json("not json"), Err(CutSpecError::Malformed(_))));
    }

    #[test]
    fn test_whole_range() {
        assert_eq!(CutSpec::whole(600.0).unwrap().duration_secs(), 600.0);
        assert!(CutSpec::whole(0.0).is_none());
    }
}
