//! Small shared helpers.

/// Maximum length of a sanitized title.
const MAX_TITLE_LEN: usize = 50;

/// Sanitize a title for use in filenames.
///
/// Only ASCII alphanumerics, hyphen, underscore and space survive; runs of
/// whitespace become a single underscore. Output is lowercase and capped.
pub fn sanitize_filename_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
        .chars()
        .take(MAX_TITLE_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename_title() {
        assert_eq!(sanitize_filename_title("Hello World"), "hello_world");
        assert_eq!(sanitize_filename_title("  Rust: async/await!  "), "rust_asyncawait");
        assert_eq!(sanitize_filename_title("Pătrunjel și mărar"), "ptrunjel_i_mrar");
        assert_eq!(sanitize_filename_title("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_filename_title(&"a".repeat(80)).len(), 50);
    }
}
