//! Colon-delimited configuration paths.
//!
//! Paths address leaves and sections in the [`ConfigTree`](super::ConfigTree):
//! `ai:clients:openai:modelid`. Comparison is always case-insensitive; the
//! original casing is kept for display and id derivation.

/// Delimiter between path segments.
pub const KEY_DELIMITER: &str = ":";

/// Segment delimiter in environment variable names.
pub const ALT_DELIMITER: &str = "__";

/// Join two path fragments with the key delimiter, skipping empty ones.
pub fn combine(base: &str, key: &str) -> String {
    match (base.is_empty(), key.is_empty()) {
        (true, _) => key.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}{KEY_DELIMITER}{key}"),
    }
}

/// Parent of a path (`a:b:c` → `a:b`), or `None` for a single segment.
pub fn parent_path(path: &str) -> Option<&str> {
    path.rfind(KEY_DELIMITER).map(|pos| &path[..pos])
}

/// Last segment of a path (`a:b:c` → `c`).
pub fn last_segment(path: &str) -> &str {
    match path.rfind(KEY_DELIMITER) {
        Some(pos) => &path[pos + KEY_DELIMITER.len()..],
        None => path,
    }
}

/// Whether a value is written as a path rather than a literal.
///
/// Only the key delimiter marks a path; `__` is common inside secrets.
pub fn looks_like_path(value: &str) -> bool {
    value.contains(KEY_DELIMITER)
}

/// Normalize a user-written path: surrounding whitespace and stray
/// delimiters are removed, empty segments are collapsed.
pub fn normalize_path(value: &str) -> String {
    value
        .trim()
        .split(KEY_DELIMITER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(KEY_DELIMITER)
}

/// Case-insensitive "starts with `prefix:`" check.
///
/// Returns the remainder after the prefix and delimiter, with original casing.
pub fn strip_section_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let head = path.get(..prefix.len())?;
    if fold(head) != fold(prefix) {
        return None;
    }
    let rest = path.get(prefix.len()..)?.strip_prefix(KEY_DELIMITER)?;
    (!rest.is_empty()).then_some(rest)
}

/// Lowercase form used as the lookup key inside the tree.
pub(crate) fn fold(path: &str) -> String {
    path.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine() {
        assert_eq!(combine("ai:clients", "openai"), "ai:clients:openai");
        assert_eq!(combine("", "openai"), "openai");
        assert_eq!(combine("ai", ""), "ai");
    }

    #[test]
    fn test_parent_and_last_segment() {
        assert_eq!(parent_path("ai:clients:openai"), Some("ai:clients"));
        assert_eq!(parent_path("ai"), None);
        assert_eq!(last_segment("ai:clients:openai"), "openai");
        assert_eq!(last_segment("ai"), "ai");
    }

    #[test]
    fn test_looks_like_path() {
        assert!(looks_like_path("secrets:openai"));
        assert!(!looks_like_path("secrets__openai"));
        assert!(!looks_like_path("sk-proj-Ab__cd9"));
        assert!(!looks_like_path("sk-abc123"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(" secrets:openai "), "secrets:openai");
        assert_eq!(normalize_path(":secrets::openai:"), "secrets:openai");
        assert_eq!(normalize_path("a:b"), "a:b");
    }

    #[test]
    fn test_strip_section_prefix() {
        assert_eq!(
            strip_section_prefix("AI:Clients:Grok", "ai:clients"),
            Some("Grok")
        );
        assert_eq!(
            strip_section_prefix("ai:clients:azure:gpt", "ai:clients"),
            Some("azure:gpt")
        );
        assert_eq!(strip_section_prefix("ai:clients", "ai:clients"), None);
        assert_eq!(strip_section_prefix("ai:clientsx:a", "ai:clients"), None);
        assert_eq!(strip_section_prefix("ai:agents:a", "ai:clients"), None);
    }
}
