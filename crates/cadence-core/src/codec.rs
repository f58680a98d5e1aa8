//! Conversion between [`RecurrenceRule`] and its persisted RFC 5545 style
//! rule string (`FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,WE;COUNT=10`).
//!
//! Rule strings live in long-lived records, so [`decode`] also accepts the
//! older stored forms: a leading `DTSTART` line, an `RRULE:` prefix,
//! lowercase keys and floating or date-only `UNTIL` values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::error::CoreError;
use crate::models::{Frequency, RecurrenceRule, Termination, WeekdaySet};
use crate::timezone::resolve_local;

const UNTIL_UTC_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const UNTIL_LOCAL_FORMAT: &str = "%Y%m%dT%H%M%S";
const UNTIL_DATE_FORMAT: &str = "%Y%m%d";

/// Serializes a rule. An interval below 1 is written as 1, and a weekly rule
/// with no weekdays omits `BYDAY` so it recurs on the anchor's weekday.
pub fn encode(rule: &RecurrenceRule) -> String {
    let mut parts = vec![format!("FREQ={}", frequency_keyword(rule.frequency))];

    let interval = rule.interval.max(1);
    if interval > 1 {
        parts.push(format!("INTERVAL={}", interval));
    }

    if rule.frequency == Frequency::Weekly && !rule.by_weekday.is_empty() {
        let days: Vec<&str> = rule.by_weekday.iter().map(weekday_keyword).collect();
        parts.push(format!("BYDAY={}", days.join(",")));
    }

    match rule.termination {
        Termination::Unbounded => {}
        Termination::Count(count) => parts.push(format!("COUNT={}", count)),
        Termination::Until(until) => {
            parts.push(format!("UNTIL={}", until.format(UNTIL_UTC_FORMAT)))
        }
    }

    parts.join(";")
}

/// Parses a stored rule string.
///
/// Returns `Ok(None)` for an empty string (the item does not recur),
/// `Err(CoreError::InvalidRule)` for anything malformed, and the rule
/// otherwise. Floating `UNTIL` values are read in `timezone`.
pub fn decode(rule: &str, timezone: Tz) -> Result<Option<RecurrenceRule>, CoreError> {
    let body = match rule_line(rule)? {
        Some(body) => body,
        None => return Ok(None),
    };

    let mut frequency = None;
    let mut interval = None;
    let mut by_weekday = None;
    let mut termination = Termination::Unbounded;

    for part in body.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| invalid(format!("expected KEY=VALUE, found '{}'", part)))?;
        let value = value.trim();

        match key.trim().to_ascii_uppercase().as_str() {
            "FREQ" => {
                if frequency.is_some() {
                    return Err(invalid("FREQ given more than once"));
                }
                frequency = Some(parse_frequency(value)?);
            }
            "INTERVAL" => {
                if interval.is_some() {
                    return Err(invalid("INTERVAL given more than once"));
                }
                let n: u32 = value
                    .parse()
                    .map_err(|_| invalid(format!("INTERVAL '{}' is not a number", value)))?;
                if n < 1 {
                    return Err(invalid("INTERVAL must be at least 1"));
                }
                interval = Some(n);
            }
            "BYDAY" => {
                if by_weekday.is_some() {
                    return Err(invalid("BYDAY given more than once"));
                }
                by_weekday = Some(parse_weekdays(value)?);
            }
            "COUNT" => {
                if termination != Termination::Unbounded {
                    return Err(invalid("only one of COUNT and UNTIL may be given"));
                }
                let n: u32 = value
                    .parse()
                    .map_err(|_| invalid(format!("COUNT '{}' is not a number", value)))?;
                if n < 1 {
                    return Err(invalid("COUNT must be at least 1"));
                }
                termination = Termination::Count(n);
            }
            "UNTIL" => {
                if termination != Termination::Unbounded {
                    return Err(invalid("only one of COUNT and UNTIL may be given"));
                }
                termination = Termination::Until(parse_until(value, timezone)?);
            }
            "WKST" => {
                if !value.eq_ignore_ascii_case("MO") {
                    return Err(invalid(format!("unsupported week start '{}'", value)));
                }
            }
            other => return Err(invalid(format!("unsupported rule part '{}'", other))),
        }
    }

    let rule = RecurrenceRule {
        frequency: frequency.ok_or_else(|| invalid("FREQ is required"))?,
        interval: interval.unwrap_or(1),
        by_weekday: by_weekday.unwrap_or_default(),
        termination,
    };
    rule.validate()?;

    Ok(Some(rule))
}

/// Picks the rule body out of the accepted layouts. `None` means there is no
/// rule at all.
fn rule_line(rule: &str) -> Result<Option<&str>, CoreError> {
    let mut body = None;
    for line in rule.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let upper = line.to_ascii_uppercase();
        if upper.starts_with("DTSTART") {
            continue;
        }
        let line = if upper.starts_with("RRULE:") {
            &line["RRULE:".len()..]
        } else {
            line
        };
        if body.replace(line).is_some() {
            return Err(invalid("more than one RRULE line"));
        }
    }

    match body {
        Some(body) if !body.trim().is_empty() => Ok(Some(body)),
        Some(_) => Ok(None),
        None if rule.trim().is_empty() => Ok(None),
        None => Err(invalid("no RRULE line found")),
    }
}

fn parse_frequency(value: &str) -> Result<Frequency, CoreError> {
    match value.to_ascii_uppercase().as_str() {
        "DAILY" => Ok(Frequency::Daily),
        "WEEKLY" => Ok(Frequency::Weekly),
        "MONTHLY" => Ok(Frequency::Monthly),
        "YEARLY" => Ok(Frequency::Yearly),
        other => Err(invalid(format!("unsupported frequency '{}'", other))),
    }
}

fn parse_weekdays(value: &str) -> Result<WeekdaySet, CoreError> {
    value
        .split(',')
        .map(|day| parse_weekday(day.trim()))
        .collect::<Result<Vec<_>, _>>()
        .map(|days| days.into_iter().collect())
}

fn parse_weekday(value: &str) -> Result<Weekday, CoreError> {
    match value.to_ascii_uppercase().as_str() {
        "MO" => Ok(Weekday::Mon),
        "TU" => Ok(Weekday::Tue),
        "WE" => Ok(Weekday::Wed),
        "TH" => Ok(Weekday::Thu),
        "FR" => Ok(Weekday::Fri),
        "SA" => Ok(Weekday::Sat),
        "SU" => Ok(Weekday::Sun),
        other => Err(invalid(format!("unsupported weekday '{}'", other))),
    }
}

fn parse_until(value: &str, timezone: Tz) -> Result<DateTime<Utc>, CoreError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, UNTIL_UTC_FORMAT) {
        return Ok(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, UNTIL_LOCAL_FORMAT) {
        return Ok(resolve_local(timezone, naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, UNTIL_DATE_FORMAT) {
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default();
        return Ok(resolve_local(timezone, date.and_time(end_of_day)));
    }
    Err(invalid(format!("UNTIL '{}' is not a date or date-time", value)))
}

pub(crate) fn frequency_keyword(frequency: Frequency) -> &'static str {
    match frequency {
        Frequency::Daily => "DAILY",
        Frequency::Weekly => "WEEKLY",
        Frequency::Monthly => "MONTHLY",
        Frequency::Yearly => "YEARLY",
    }
}

fn weekday_keyword(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::InvalidRule(message.into())
}
