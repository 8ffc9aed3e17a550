use chrono::TimeZone;

pub fn now_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Trim `s`, mapping blank strings to `None`
pub fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Render unix seconds as an rfc3339 string for log lines
pub fn fmt_seconds(seconds: i64) -> String {
    chrono::Utc
        .timestamp_opt(seconds, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| seconds.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_strings_are_none() {
        assert_eq!(non_empty(Some("  ")), None);
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some(" Moon Safari ")), Some("Moon Safari".to_string()));
    }

    #[test]
    fn formats_seconds() {
        assert_eq!(fmt_seconds(1136073600), "2006-01-01T00:00:00Z");
    }
}
