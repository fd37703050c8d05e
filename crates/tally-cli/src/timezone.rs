use chrono::{DateTime, Utc};
use tally_core::error::CoreError;
use tally_core::timezone::{format_with_timezone, validate_timezone};

/// Detect system timezone
pub fn detect_system_timezone() -> String {
    if let Ok(tz) = std::env::var("TZ") {
        if !tz.is_empty() && validate_timezone(&tz).is_ok() {
            return tz;
        }
    }

    if let Ok(tz) = iana_time_zone::get_timezone() {
        if validate_timezone(&tz).is_ok() {
            return tz;
        }
    }

    "UTC".to_string()
}

/// Zones shown when a name cannot be resolved. Game servers tend to sit in these.
fn common_timezones() -> [&'static str; 14] {
    [
        "UTC",
        "America/New_York",
        "America/Chicago",
        "America/Los_Angeles",
        "America/Sao_Paulo",
        "Europe/London",
        "Europe/Paris",
        "Europe/Berlin",
        "Asia/Tokyo",
        "Asia/Seoul",
        "Asia/Shanghai",
        "Asia/Singapore",
        "Australia/Sydney",
        "Pacific/Auckland",
    ]
}

/// Suggest similar timezone for invalid input
pub fn suggest_timezone(invalid: &str) -> Vec<&'static str> {
    let invalid_lower = invalid.to_lowercase();
    let mut matches: Vec<_> = common_timezones()
        .into_iter()
        .filter(|tz| {
            let tz_lower = tz.to_lowercase();
            tz_lower.contains(&invalid_lower)
                || invalid_lower.contains(&tz_lower)
                || tz.split('/').any(|part| part.to_lowercase().contains(&invalid_lower))
        })
        .collect();
    if matches.is_empty() && invalid_lower.len() >= 3 {
        matches = chrono_tz::TZ_VARIANTS
            .iter()
            .map(|tz| tz.name())
            .filter(|name| name.to_lowercase().contains(&invalid_lower))
            .collect();
    }
    matches.truncate(5);
    matches
}

/// Convert user-friendly timezone input to IANA name
pub fn normalize_timezone_input(input: &str) -> Result<String, CoreError> {
    let input = input.trim();
    if validate_timezone(input).is_ok() {
        return Ok(input.to_string());
    }

    let normalized = match input.to_lowercase().as_str() {
        "est" | "eastern" => "America/New_York",
        "cst" | "central" => "America/Chicago",
        "pst" | "pacific" => "America/Los_Angeles",
        "gmt" | "utc" | "z" => "UTC",
        "bst" | "london" => "Europe/London",
        "cet" | "paris" => "Europe/Paris",
        "jst" | "tokyo" => "Asia/Tokyo",
        "kst" | "seoul" => "Asia/Seoul",
        _ => {
            let suggestions = suggest_timezone(input);
            return Err(if suggestions.is_empty() {
                CoreError::InvalidTimezone(format!(
                    "Unknown timezone '{}'. Use standard IANA names like 'Asia/Seoul'",
                    input
                ))
            } else {
                CoreError::InvalidTimezone(format!(
                    "Unknown timezone '{}'. Did you mean: {}?",
                    input,
                    suggestions.join(", ")
                ))
            });
        }
    };

    validate_timezone(normalized)?;
    Ok(normalized.to_string())
}

/// `2024-03-06 09:00 (KST)` in the given zone
pub fn format_timezone_display(datetime: DateTime<Utc>, timezone: &str) -> Result<String, CoreError> {
    format_with_timezone(datetime, timezone, "%a %Y-%m-%d %H:%M (%Z)")
}
