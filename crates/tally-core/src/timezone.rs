//! Display-side timezone helpers. Boundaries are always computed in UTC;
//! these only render them for a reader somewhere else.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

/// Parse an IANA timezone name
pub fn parse_timezone(timezone: &str) -> Result<Tz, CoreError> {
    Tz::from_str(timezone.trim()).map_err(|_| CoreError::InvalidTimezone(timezone.to_string()))
}

/// Validate IANA timezone name
pub fn validate_timezone(timezone: &str) -> Result<(), CoreError> {
    parse_timezone(timezone).map(|_| ())
}

pub fn format_with_timezone(datetime: DateTime<Utc>, timezone: &str, format: &str) -> Result<String, CoreError> {
    let tz = parse_timezone(timezone)?;
    Ok(datetime.with_timezone(&tz).format(format).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_validate_timezone() {
        assert!(validate_timezone("UTC").is_ok());
        assert!(validate_timezone("Asia/Seoul").is_ok());
        assert!(validate_timezone("Invalid/Timezone").is_err());
    }

    #[test]
    fn test_wednesday_reset_in_local_time() {
        let reset = Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap();
        assert_eq!(
            format_with_timezone(reset, "Asia/Seoul", "%a %H:%M").unwrap(),
            "Wed 09:00"
        );
        assert_eq!(
            format_with_timezone(reset, "America/New_York", "%a %H:%M").unwrap(),
            "Tue 19:00"
        );
    }
}
