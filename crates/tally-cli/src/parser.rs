use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_english::{parse_date_string, Dialect};

/// Parses "now", "tomorrow", "next wednesday", "2024-03-06 12:00" and the
/// like, relative to `now`. Input without a zone is read as UTC.
pub fn parse_when(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("now") {
        return Ok(now);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    parse_date_string(input, now, Dialect::Uk)
        .map_err(|e| anyhow::anyhow!("Failed to parse date '{}': {}", input, e))
}

/// `--at` if given, otherwise the current time.
pub fn parse_optional_when(input: Option<&str>) -> Result<DateTime<Utc>> {
    let now = Utc::now();
    input.map_or(Ok(now), |s| parse_when(s, now))
}
