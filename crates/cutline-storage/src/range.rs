//! HTTP `Range` header handling for single byte ranges.

/// What to serve for a request against an object of known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    /// Whole object (no header, an unparseable header, or several ranges)
    Full,
    /// Inclusive byte range
    Partial { start: u64, end: u64 },
    /// Range lies entirely past the end of the object
    Unsatisfiable,
}

impl RangeOutcome {
    /// Number of bytes served for an object of `len` bytes.
    pub fn served_len(&self, len: u64) -> u64 {
        match self {
            RangeOutcome::Full => len,
            RangeOutcome::Partial { start, end } => end - start + 1,
            RangeOutcome::Unsatisfiable => 0,
        }
    }

    /// `Content-Range` value for a partial response.
    pub fn content_range(&self, len: u64) -> Option<String> {
        match self {
            RangeOutcome::Partial { start, end } => Some(format!("bytes {}-{}/{}", start, end, len)),
            RangeOutcome::Unsatisfiable => Some(format!("bytes */{}", len)),
            RangeOutcome::Full => None,
        }
    }
}

/// Resolve a `Range` header against an object of `len` bytes.
///
/// Supports `bytes=a-b`, `bytes=a-` and `bytes=-n`. Malformed headers and
/// multi-range requests fall back to serving the whole object.
pub fn resolve_range(header: Option<&str>, len: u64) -> RangeOutcome {
    let Some(header) = header else {
        return RangeOutcome::Full;
    };
    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return RangeOutcome::Full;
    };
    if spec.contains(',') {
        return RangeOutcome::Full;
    }
    let Some((first, last)) = spec.trim().split_once('-') else {
        return RangeOutcome::Full;
    };
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        // Suffix range: the final `n` bytes.
        let Ok(n) = last.parse::<u64>() else {
            return RangeOutcome::Full;
        };
        if n == 0 || len == 0 {
            return RangeOutcome::Unsatisfiable;
        }
        let start = len.saturating_sub(n);
        return RangeOutcome::Partial { start, end: len - 1 };
    }

    let Ok(start) = first.parse::<u64>() else {
        return RangeOutcome::Full;
    };
    let end = if last.is_empty() {
        None
    } else {
        match last.parse::<u64>() {
            Ok(end) if end >= start => Some(end),
            _ => return RangeOutcome::Full,
        }
    };

    if start >= len {
        return RangeOutcome::Unsatisfiable;
    }
    let end = end.map_or(len - 1, |e| e.min(len - 1));
    RangeOutcome::Partial { start, end }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_header_serves_full() {
        assert_eq!(resolve_range(None, 100), RangeOutcome::Full);
    }

    #[test]
    fn test_bounded_and_open_ranges() {
        assert_eq!(
            resolve_range(Some("bytes=0-9"), 100),
            RangeOutcome::Partial { start: 0, end: 9 }
        );
        assert_eq!(
            resolve_range(Some("bytes=90-"), 100),
            RangeOutcome::Partial { start: 90, end: 99 }
        );
        // End past the object is clamped.
        assert_eq!(
            resolve_range(Some("bytes=50-500"), 100),
            RangeOutcome::Partial { start: 50, end: 99 }
        );
    }

    #[test]
    fn test_suffix_range() {
        assert_eq!(
            resolve_range(Some("bytes=-10"), 100),
            RangeOutcome::Partial { start: 90, end: 99 }
        );
        assert_eq!(
            resolve_range(Some("bytes=-500"), 100),
            RangeOutcome::Partial { start: 0, end: 99 }
        );
        assert_eq!(resolve_range(Some("bytes=-0"), 100), RangeOutcome::Unsatisfiable);
    }

    #[test]
    fn test_unsatisfiable() {
        let outcome = resolve_range(Some("bytes=100-"), 100);
        assert_eq!(outcome, RangeOutcome::Unsatisfiable);
        assert_eq!(outcome.content_range(100).as_deref(), Some("bytes */100"));
    }

    #[test]
    fn test_fallbacks_to_full() {
        assert_eq!(resolve_range(Some("bytes=0-1,5-9"), 100), RangeOutcome::Full);
        assert_eq!(resolve_range(Some("items=0-1"), 100), RangeOutcome::Full);
        assert_eq!(resolve_range(Some("bytes=9-1"), 100), RangeOutcome::Full);
        assert_eq!(resolve_range(Some("bytes=abc"), 100), RangeOutcome::Full);
    }

    #[test]
    fn test_content_range_header() {
        let outcome = RangeOutcome::Partial { start: 10, end: 19 };
        assert_eq!(outcome.content_range(100).as_deref(), Some("bytes 10-19/100"));
        assert_eq!(outcome.served_len(100), 10);
        assert_eq!(RangeOutcome::Full.content_range(100), None);
    }
}
