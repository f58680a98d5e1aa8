use anyhow::{anyhow, Result};
use cadence_core::timezone::resolve_local;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use chrono_english::{parse_date_string, Dialect};
use chrono_tz::Tz;

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parses a user-supplied time. Accepts RFC 3339, `YYYY-MM-DD[ HH:MM[:SS]]`
/// read as wall time in `tz`, or natural language such as `next monday 9am`.
pub fn parse_datetime(input: &str, tz: Tz) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(resolve_local(tz, naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(resolve_local(tz, date.and_time(NaiveTime::default())));
    }

    parse_date_string(input, Utc::now().with_timezone(&tz), Dialect::Uk)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| anyhow!("Failed to parse date '{}': {}", input, e))
}

/// Like [`parse_datetime`], but a bare date means the end of that day.
pub fn parse_until(input: &str, tz: Tz) -> Result<DateTime<Utc>> {
    match NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d") {
        Ok(date) => {
            let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default();
            Ok(resolve_local(tz, date.and_time(end_of_day)))
        }
        Err(_) => parse_datetime(input, tz),
    }
}

/// Parses `mon,wed,fri` (full names also accepted).
pub fn parse_weekdays(input: &str) -> Result<Vec<Weekday>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<Weekday>()
                .map_err(|_| anyhow!("Invalid weekday '{}'. Use mon,tue,wed,thu,fri,sat,sun", part))
        })
        .collect()
}
