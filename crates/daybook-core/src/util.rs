//! Small helpers shared by the config, transport and cache layers.

const EXCERPT_CHARS: usize = 180;

/// `Some(trimmed)` unless the value is missing or blank.
pub fn non_blank(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Leading part of a response body, for error messages and logs.
pub fn body_excerpt(body: &str) -> String {
    body.trim().chars().take(EXCERPT_CHARS).collect()
}

/// Unix epoch milliseconds; the unit of cache and history timestamps.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_blank_drops_whitespace_only_values() {
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some(" \t ".to_string())), None);
        assert_eq!(
            non_blank(Some(" http://127.0.0.1:3457 ".to_string())).as_deref(),
            Some("http://127.0.0.1:3457")
        );
    }

    #[test]
    fn only_http_schemes_are_urls() {
        assert!(is_http_url("http://localhost:3457"));
        assert!(is_http_url("https://notes.example.com"));
        assert!(!is_http_url("ftp://notes.example.com"));
        assert!(!is_http_url("notes.example.com"));
    }

    #[test]
    fn body_excerpt_is_bounded() {
        let body = "x".repeat(EXCERPT_CHARS * 3);
        assert_eq!(body_excerpt(&body).chars().count(), EXCERPT_CHARS);
        assert_eq!(body_excerpt("  {\"error\":\"nope\"}\n"), "{\"error\":\"nope\"}");
    }

    #[test]
    fn millis_clock_is_after_2024() {
        assert!(unix_millis_now() > 1_704_067_200_000);
    }
}
