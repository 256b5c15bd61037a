//! Timestamp parsing and formatting.
//!
//! Cut points are written as `HH:MM:SS`, `MM:SS` or `SS`, each optionally
//! followed by fractional seconds (`00:01:30.250`).

use thiserror::Error;

/// Longest offset accepted anywhere in a cut point (24 hours).
pub const MAX_TIMESTAMP_SECS: f64 = 86_400.0;

const UNITS: [&str; 3] = ["hours", "minutes", "seconds"];

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Timestamp cannot be negative")]
    Negative,

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid {0} value: {1} (must be below 60)")]
    OutOfRange(&'static str, String),

    #[error("Invalid timestamp format '{0}'. Use HH:MM:SS, MM:SS or SS")]
    InvalidFormat(String),

    #[error("Timestamp exceeds maximum allowed offset (24 hours)")]
    TooLarge,
}

/// Parse a timestamp string to total seconds.
///
/// # Examples
/// ```
/// use cutline_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timestamp("90").unwrap(), 90.0);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    if parts.len() > UNITS.len() {
        return Err(TimestampError::InvalidFormat(ts.to_string()));
    }

    let offset = UNITS.len() - parts.len();
    let mut total = 0.0;

    for (idx, raw) in parts.iter().enumerate() {
        let unit = UNITS[offset + idx];
        let is_leading = idx == 0;
        let value = parse_component(raw, unit)?;

        // Only the seconds component may carry a fraction.
        if unit != "seconds" && value.fract() != 0.0 {
            return Err(TimestampError::InvalidValue(unit, raw.to_string()));
        }
        // A leading component may overflow (e.g. "90" seconds); inner ones may not.
        if !is_leading && value >= 60.0 {
            return Err(TimestampError::OutOfRange(unit, raw.to_string()));
        }

        total = total * 60.0 + value;
    }

    if total > MAX_TIMESTAMP_SECS {
        return Err(TimestampError::TooLarge);
    }

    Ok(total)
}

fn parse_component(raw: &str, unit: &'static str) -> Result<f64, TimestampError> {
    let trimmed = raw.trim();
    if trimmed.starts_with('-') {
        return Err(TimestampError::Negative);
    }
    // Rejects "inf", "NaN", "1e3" and friends that f64::from_str would accept.
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(TimestampError::InvalidValue(unit, raw.to_string()));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TimestampError::InvalidValue(unit, raw.to_string()))
}

/// Format seconds as `HH:MM:SS`, or `HH:MM:SS.mmm` when there is a fraction.
pub fn format_seconds(total_secs: f64) -> String {
    let total_secs = total_secs.max(0.0);
    let hours = (total_secs / 3600.0).floor() as u32;
    let mins = ((total_secs % 3600.0) / 60.0).floor() as u32;
    let secs = total_secs % 60.0;

    if (secs - secs.floor()).abs() > 0.0001 {
        format!("{:02}:{:02}:{:06.3}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, mins, secs.floor() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_form() {
        assert_eq!(parse_timestamp("00:00:00").unwrap(), 0.0);
        assert_eq!(parse_timestamp("00:01:00").unwrap(), 60.0);
        assert_eq!(parse_timestamp("01:30:45").unwrap(), 5445.0);
    }

    #[test]
    fn test_parse_short_forms() {
        assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
        assert_eq!(parse_timestamp("90").unwrap(), 90.0);
        assert_eq!(parse_timestamp(" 75:00 ").unwrap(), 4500.0);
    }

    #[test]
    fn test_parse_fractional_seconds() {
        let result = parse_timestamp("00:00:30.500").unwrap();
        assert!((result - 30.5).abs() < 0.001);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_timestamp(""), Err(TimestampError::Empty));
        assert_eq!(parse_timestamp("   "), Err(TimestampError::Empty));
        assert!(matches!(parse_timestamp("abc"), Err(TimestampError::InvalidValue(..))));
        assert!(matches!(parse_timestamp("1:2:3:4"), Err(TimestampError::InvalidFormat(_))));
        assert!(matches!(parse_timestamp("00:-1:00"), Err(TimestampError::Negative)));
        assert!(matches!(parse_timestamp("inf"), Err(TimestampError::InvalidValue(..))));
        assert!(matches!(parse_timestamp("00::10"), Err(TimestampError::InvalidValue(..))));
    }

    #[test]
    fn test_inner_components_bounded() {
        assert!(matches!(parse_timestamp("00:75:00"), Err(TimestampError::OutOfRange("minutes", _))));
        assert!(matches!(parse_timestamp("01:61"), Err(TimestampError::OutOfRange("seconds", _))));
        assert!(matches!(parse_timestamp("00:01.5:00"), Err(TimestampError::InvalidValue("minutes", _))));
    }

    #[test]
    fn test_rejects_more_than_a_day() {
        assert_eq!(parse_timestamp("25:00:00"), Err(TimestampError::TooLarge));
        assert!(parse_timestamp("24:00:00").is_ok());
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(0.0), "00:00:00");
        assert_eq!(format_seconds(90.0), "00:01:30");
        assert_eq!(format_seconds(3661.0), "01:01:01");
        assert_eq!(format_seconds(30.5), "00:00:30.500");
    }
}
