//! Date cleaning.
//!
//! Accepted inputs, all normalized to `YYYY-MM-DD`:
//!
//! - ISO-like `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYY.MM.DD`, with an optional time
//! - US `MM/DD/YYYY`
//! - `YYYY年M月D日`
//! - compact `YYYYMMDD`
//! - Unix timestamps: 10 digits (seconds) or 13 digits (milliseconds)
//! - spreadsheet serial day numbers (serial 1 = 1900-01-01)
//!
//! Two-digit years are never accepted.

use chrono::{DateTime, Datelike, Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::cell_text;
use crate::models::CleanResult;

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

/// Serials above this include the phantom 1900-02-29 and are shifted back a day.
const LEAP_BUG_SERIAL: i64 = 59;

static ISO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})([-/.])(\d{1,2})([-/.])(\d{1,2})(?:[T\s].*)?$").expect("valid regex"));
static CN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*[日号]?(?:\s.*)?$").expect("valid regex")
});
static US_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})(?:\s.*)?$").expect("valid regex"));
static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)(?:\.\d+)?$").expect("valid regex"));

/// Clean a date cell into `YYYY-MM-DD`.
pub fn clean_date(value: &Value) -> CleanResult<String> {
    let raw = match cell_text(value) {
        Ok(Some(raw)) => raw,
        Ok(None) => return CleanResult::success(String::new()),
        Err(e) => return CleanResult::failure(e),
    };

    match parse_date(&raw) {
        Ok(date) if (MIN_YEAR..=MAX_YEAR).contains(&date.year()) => {
            CleanResult::success(date.format("%Y-%m-%d").to_string())
        }
        Ok(date) => CleanResult::failure(format!(
            "date '{}' resolves to year {}, outside {}-{}",
            raw,
            date.year(),
            MIN_YEAR,
            MAX_YEAR
        )),
        Err(e) => CleanResult::failure(e),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    if let Some(caps) = NUMERIC_RE.captures(raw) {
        return parse_numeric(raw, &caps[1]);
    }
    if let Some(caps) = ISO_RE.captures(raw) {
        // Both separators must match: `2023-08/15` is not a date.
        if caps[2] != caps[4] {
            return Err(format!("mixed date separators: '{}'", raw));
        }
        return build_date(raw, &caps[1], &caps[3], &caps[5]);
    }
    if let Some(caps) = CN_RE.captures(raw) {
        return build_date(raw, &caps[1], &caps[2], &caps[3]);
    }
    if let Some(caps) = US_RE.captures(raw) {
        return build_date(raw, &caps[3], &caps[1], &caps[2]);
    }
    Err(format!("unrecognized date format: '{}'", raw))
}

/// Bare digits: timestamp, compact date or spreadsheet serial.
fn parse_numeric(raw: &str, integer: &str) -> Result<NaiveDate, String> {
    let is_integer = integer.len() == raw.len();
    match integer.len() {
        13 if is_integer => from_unix_millis(raw, integer),
        10 if is_integer => from_unix_seconds(raw, integer),
        8 if is_integer => build_date(raw, &integer[..4], &integer[4..6], &integer[6..]),
        1..=6 => {
            let serial: i64 = integer
                .parse()
                .map_err(|_| format!("invalid serial date '{}'", raw))?;
            from_serial(serial).ok_or_else(|| format!("invalid serial date '{}'", raw))
        }
        _ => Err(format!("unrecognized numeric date: '{}'", raw)),
    }
}

/// Spreadsheet serial → date. Serial 1 is 1900-01-01; serials after 59
/// skip the non-existent 1900-02-29.
pub fn from_serial(serial: i64) -> Option<NaiveDate> {
    if serial < 1 {
        return None;
    }
    let days = if serial > LEAP_BUG_SERIAL { serial - 1 } else { serial };
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 31)?;
    epoch.checked_add_signed(Duration::try_days(days)?)
}

fn from_unix_seconds(raw: &str, digits: &str) -> Result<NaiveDate, String> {
    let secs: i64 = digits.parse().map_err(|_| format!("invalid timestamp '{}'", raw))?;
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| format!("invalid timestamp '{}'", raw))
}

fn from_unix_millis(raw: &str, digits: &str) -> Result<NaiveDate, String> {
    let millis: i64 = digits.parse().map_err(|_| format!("invalid timestamp '{}'", raw))?;
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| format!("invalid timestamp '{}'", raw))
}

/// Construct a date and confirm the calendar round-trips the parsed digits.
fn build_date(raw: &str, year: &str, month: &str, day: &str) -> Result<NaiveDate, String> {
    let invalid = || format!("invalid calendar date '{}'", raw);
    let y: i32 = year.parse().map_err(|_| invalid())?;
    let m: u32 = month.parse().map_err(|_| invalid())?;
    let d: u32 = day.parse().map_err(|_| invalid())?;
    let date = NaiveDate::from_ymd_opt(y, m, d).ok_or_else(invalid)?;
    if (date.year(), date.month(), date.day()) != (y, m, d) {
        return Err(invalid());
    }
    Ok(date)
}
