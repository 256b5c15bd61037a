//! Input checks and sanitization for request parameters.
//!
//! Source URLs are vetted by the resolver; this module covers the values
//! that reach handlers directly: path parameters, search queries and the
//! names echoed back in response headers.

/// Maximum search query length, in characters.
pub const MAX_QUERY_LENGTH: usize = 200;

/// Maximum artifact file name length.
const MAX_FILENAME_LENGTH: usize = 128;

/// Strip control characters and cap the length of a search query.
pub fn sanitize_query(input: &str) -> String {
    input
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_QUERY_LENGTH)
        .collect()
}

/// Validate an artifact file name from a URL path.
///
/// Valid format: alphanumeric, hyphens, underscores, dots. No path traversal.
pub fn is_valid_artifact_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_FILENAME_LENGTH {
        return false;
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// Build an `attachment` Content-Disposition value.
///
/// Non-ASCII names get an ASCII fallback plus an RFC 5987 `filename*`.
pub fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if fallback == file_name {
        return format!("attachment; filename=\"{}\"", fallback);
    }

    let encoded: String = file_name
        .bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() || b"-_.~".contains(&b) {
                (b as char).to_string()
            } else {
                format!("%{:02X}", b)
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}
