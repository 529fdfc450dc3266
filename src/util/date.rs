use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Naive ISO 8601 layouts, interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses a feed date into Unix epoch seconds.
///
/// Accepts RFC 3339 (`dc:date`, Atom `updated`), RFC 2822/822 (RSS
/// `pubDate`), ISO 8601 with a `+hhmm` offset, naive date-times and bare
/// `YYYY-MM-DD` dates. Anything without an offset is taken as UTC.
///
/// Returns `None` for blank or unrecognized input.
///
/// # Examples
///
/// ```
/// use feedtree::util::parse_timestamp;
///
/// assert_eq!(parse_timestamp("2020-01-01T00:00:00Z"), Some(1577836800));
/// assert_eq!(parse_timestamp("Wed, 01 Jan 2020 00:00:00 GMT"), Some(1577836800));
/// assert_eq!(parse_timestamp("yesterday-ish"), None);
/// ```
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.timestamp());
    }
    // Some generators write "UTC", which RFC 822 never defined
    if let Some(head) = value.strip_suffix(" UTC") {
        if let Ok(dt) = DateTime::parse_from_rfc2822(&format!("{head} +0000")) {
            return Some(dt.timestamp());
        }
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.timestamp());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc().timestamp());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}
