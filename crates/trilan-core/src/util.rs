//! Small helpers shared by the config, auth and mirror modules.

use chrono::{DateTime, SecondsFormat, Utc};

/// Longest response excerpt kept in an error message
const MAX_EXCERPT_CHARS: usize = 180;

/// Trim `value`, treating blank text the same as a missing value.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Whether `value` is an absolute `http://` or `https://` URL with a host part.
pub fn is_http_url(value: &str) -> bool {
    value
        .split_once("://")
        .is_some_and(|(scheme, rest)| matches!(scheme, "http" | "https") && !rest.is_empty())
}

/// A single-line excerpt of an HTTP response body, or `None` if it is blank.
pub fn body_excerpt(body: &str) -> Option<String> {
    let excerpt = body
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_EXCERPT_CHARS)
        .collect::<String>();
    (!excerpt.is_empty()).then_some(excerpt)
}

pub fn unix_timestamp_now() -> i64 {
    Utc::now().timestamp()
}

/// Render a timestamp the way records store it: RFC 3339, millisecond precision, `Z` suffix.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
