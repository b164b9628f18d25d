use chrono::{NaiveDate, NaiveDateTime};

/// Sentinel value returned by `detect_date_format` when the column contains
/// RFC 3339 / ISO 8601 timestamps with an offset (e.g. `2021-08-09T00:01:00Z`).
pub const RFC3339_FORMAT: &str = "__rfc3339__";

/// Timestamp layouts seen in station exports, most common first.
pub const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
];

/// Output layout for timestamps in reports (ISO 8601 without offset).
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Detect the most likely date format from a slice of string values.
/// Returns the format string with the highest parse success rate over a
/// sample of the first 100 non-empty values.
pub fn detect_date_format(values: &[String]) -> Option<&'static str> {
    let sample: Vec<&str> = values
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .take(100)
        .collect();

    if sample.is_empty() {
        return None;
    }

    let rfc3339_valid = sample
        .iter()
        .filter(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok())
        .count();
    let rfc3339_score = rfc3339_valid as f64 / sample.len() as f64;

    let mut best_format: Option<&'static str> = None;
    let mut best_score: f64 = rfc3339_score;
    if rfc3339_score > 0.0 {
        best_format = Some(RFC3339_FORMAT);
    }

    for &fmt in DATE_FORMATS {
        let valid = sample.iter().filter(|s| parse_datetime(s, fmt).is_some()).count();
        let score = valid as f64 / sample.len() as f64;
        if score > best_score {
            best_score = score;
            best_format = Some(fmt);
        }
    }

    if best_score > 0.0 {
        best_format
    } else {
        None
    }
}

/// Parse one value with the given format. Date-only formats land at midnight.
/// RFC 3339 values are converted to UTC and the offset dropped.
pub fn parse_datetime(value: &str, format: &str) -> Option<NaiveDateTime> {
    if format == RFC3339_FORMAT {
        return chrono::DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| dt.naive_utc());
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
        Some(dt)
    } else if let Ok(d) = NaiveDate::parse_from_str(value, format) {
        d.and_hms_opt(0, 0, 0)
    } else {
        None
    }
}

/// Try to parse a string column as timestamps.
/// Returns the parsed column and the fraction of values that parsed, or
/// `None` when no known format matches.
pub fn column_to_datetimes(data: &[String]) -> Option<(Vec<Option<NaiveDateTime>>, f64)> {
    let format = detect_date_format(data)?;

    let parsed: Vec<Option<NaiveDateTime>> =
        data.iter().map(|s| parse_datetime(s.trim(), format)).collect();
    let valid = parsed.iter().filter(|p| p.is_some()).count();

    let frac = if data.is_empty() { 0.0 } else { valid as f64 / data.len() as f64 };
    Some((parsed, frac))
}

/// Format a timestamp the way the statistics document carries it.
pub fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format(ISO_FORMAT).to_string()
}
