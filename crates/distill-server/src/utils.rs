//! crates/distill-server/src/utils.rs
//! Shared utility functions used across the codebase

/// Truncate a string to at most `max_len` bytes with an ellipsis.
///
/// Never splits a UTF-8 code point: if `max_len` lands inside a
/// multi-byte character the cut moves back to the previous boundary.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Truncate without appending an ellipsis (used for compact ids in log lines).
pub fn truncate_at_boundary(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Current wall-clock time as a millisecond epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_string() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn truncate_exact_length() {
        assert_eq!(truncate("hello", 5), "hello");
    }

    #[test]
    fn truncate_long_string() {
        assert_eq!(truncate("hello world", 5), "hello...");
    }

    #[test]
    fn truncate_respects_char_boundary() {
        // "é" is two bytes; cutting at 1 must not split it
        assert_eq!(truncate("émigré", 1), "...");
    }

    #[test]
    fn truncate_at_boundary_no_ellipsis() {
        assert_eq!(truncate_at_boundary("session-abc123", 7), "session");
        assert_eq!(truncate_at_boundary("short", 10), "short");
    }

    #[test]
    fn now_millis_is_recent() {
        // Sanity: after 2020-01-01 in ms
        assert!(now_millis() > 1_577_836_800_000);
    }
}
