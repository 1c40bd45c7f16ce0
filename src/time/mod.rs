//! Timestamp helpers for the session list

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum DateError {
    #[error("Missing date field in '{0}'")]
    MissingField(String),
    #[error("Date out of range: '{0}'")]
    OutOfRange(String),
}

const MS_PER_DAY: f64 = 1000.0 * 3600.0 * 24.0;

/// Parse a backend UTC timestamp.
///
/// The text is split on every non-digit character and the first six numeric
/// fields are read as year, month (1-indexed), day, hour, minute, second.
/// Both `2024-03-05 13:45:00` and `2024-03-05T13:45:00.123+00:00` parse.
pub fn date_from_utc(s: &str) -> Result<DateTime<Utc>, DateError> {
    let fields: Vec<u32> = s
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .take(6)
        .map(|part| {
            part.parse::<u32>()
                .map_err(|_| DateError::OutOfRange(s.to_string()))
        })
        .collect::<Result<_, _>>()?;

    if fields.len() < 6 {
        return Err(DateError::MissingField(s.to_string()));
    }

    let year = i32::try_from(fields[0]).map_err(|_| DateError::OutOfRange(s.to_string()))?;

    Utc.with_ymd_and_hms(year, fields[1], fields[2], fields[3], fields[4], fields[5])
        .single()
        .ok_or_else(|| DateError::OutOfRange(s.to_string()))
}

/// Human-readable relative date.
///
/// `today` is the current calendar day; the comparison is made against its
/// midnight. Dates on that day read "today at HH:MM", one to five days back
/// read "yesterday" / "N days ago", anything else gets an absolute date.
pub fn format_date_time(date: NaiveDateTime, today: NaiveDate) -> String {
    let midnight = today.and_hms_opt(0, 0, 0).unwrap_or_default();
    let diff_ms = (midnight - date).num_milliseconds() as f64;
    let day_diff = (diff_ms / MS_PER_DAY).ceil() as i64;

    let clock = format!("{:02}:{:02}", date.hour(), date.minute());

    match day_diff {
        0 => format!("today at {}", clock),
        1 => format!("yesterday at {}", clock),
        2..=5 => format!("{} days ago at {}", day_diff, clock),
        _ => format!("{} at {}", date.format("%Y/%m/%d"), clock),
    }
}

/// Format a UTC instant relative to the local current day.
pub fn format_local(date: DateTime<Utc>) -> String {
    let local = date.with_timezone(&Local);
    format_date_time(local.naive_local(), Local::now().date_naive())
}
