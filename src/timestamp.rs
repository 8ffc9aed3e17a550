/*!
Timestamp normalization

Scrobble exports carry play times as unix seconds, unix milliseconds, or
calendar strings. Everything is folded into unix seconds here.
*/
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::{utils, LOG};

/// Exclusive bounds of integers accepted as unix seconds (~2001 to ~2033)
pub const SECONDS_MIN: i64 = 1_000_000_000;
pub const SECONDS_MAX: i64 = 2_000_000_000;

/// Integers above this are taken to be unix milliseconds
pub const MILLIS_MIN: i64 = 10_000_000_000;

// naive formats are read as utc
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    // last.fm csv exports, `utc_time` column
    "%d %b %Y, %H:%M",
    "%d %b %Y %H:%M",
];

/// Normalize `token` to unix seconds, falling back to the current
/// time (with a warning) when nothing parses.
pub fn normalize(token: &str) -> i64 {
    normalize_at(token, utils::now_seconds())
}

/// `normalize`, with the fallback time supplied by the caller
pub fn normalize_at(token: &str, now: i64) -> i64 {
    match parse(token) {
        Some(seconds) => seconds,
        None => {
            slog::warn!(
                LOG, "could not parse timestamp, using current time";
                "token" => token,
                "now" => now,
            );
            now
        }
    }
}

/// Parse `token` to unix seconds without any fallback.
///
/// Rules, first match wins:
/// 1. integers strictly between `SECONDS_MIN` and `SECONDS_MAX` are seconds
/// 2. integers strictly above `MILLIS_MIN` are milliseconds, floored
/// 3. calendar strings (rfc3339, rfc2822, iso-ish naive, date only)
///
/// Integers outside both ranges are rejected rather than guessed at.
pub fn parse(token: &str) -> Option<i64> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    if let Ok(n) = token.parse::<i64>() {
        if n > SECONDS_MIN && n < SECONDS_MAX {
            return Some(n);
        }
        if n > MILLIS_MIN {
            return Some(n.div_euclid(1000));
        }
        slog::debug!(LOG, "integer timestamp outside accepted ranges"; "token" => token);
        return None;
    }
    parse_calendar(token)
}

fn parse_calendar(token: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
        return Some(floor_seconds(dt.timestamp_millis()));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(token) {
        return Some(dt.timestamp());
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(token, fmt) {
            return Some(floor_seconds(
                DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).timestamp_millis(),
            ));
        }
    }
    // date-only iso strings are midnight utc
    if let Ok(d) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        return d
            .and_hms_opt(0, 0, 0)
            .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).timestamp());
    }
    None
}

fn floor_seconds(millis: i64) -> i64 {
    millis.div_euclid(1000)
}
