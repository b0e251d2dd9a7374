//! Phone number cleaning.
//!
//! Domestic numbers are either 11-digit mobiles (`1[3-9]xxxxxxxxx`) or
//! landlines: a 7–8 digit local number, or a 10–12 digit number with its
//! `0`-prefixed area code. `+86` is stripped; other `+` numbers only get a
//! length plausibility check.

use serde_json::Value;

use super::cell_text;
use crate::models::CleanResult;

const NATIONAL_PREFIX: &str = "+86";

/// Clean a phone cell into digits (with a leading `+` for foreign numbers).
///
/// A value written with hyphens is read as landline notation
/// (`area code-subscriber`), so it only validates as a landline.
pub fn clean_phone(value: &Value) -> CleanResult<String> {
    let raw = match cell_text(value) {
        Ok(Some(raw)) => raw,
        Ok(None) => return CleanResult::success(String::new()),
        Err(e) => return CleanResult::failure(e),
    };

    let landline_notation = raw.contains('-');
    let normalized = normalize(&raw);
    let digits = normalized.trim_start_matches('+');
    if digits.is_empty() {
        return CleanResult::failure(format!("phone number '{}' contains no digits", raw));
    }

    if let Some(domestic) = normalized.strip_prefix(NATIONAL_PREFIX) {
        return validate_domestic(domestic, landline_notation, &raw);
    }
    if normalized.starts_with('+') {
        return if (7..=15).contains(&digits.len()) {
            CleanResult::success(normalized)
        } else {
            CleanResult::failure(format!(
                "international number '{}' must have 7-15 digits, found {}",
                raw,
                digits.len()
            ))
        };
    }
    validate_domestic(&normalized, landline_notation, &raw)
}

/// Keep digits, plus a `+` only when it is the first visible character.
fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    if raw.trim_start().starts_with('+') {
        out.push('+');
    }
    out.extend(raw.chars().filter(|c| c.is_ascii_digit()));
    out
}

fn validate_domestic(digits: &str, landline_notation: bool, raw: &str) -> CleanResult<String> {
    if !landline_notation && is_mobile(digits) {
        return CleanResult::success(digits.to_string());
    }
    if is_landline(digits) {
        return CleanResult::success(digits.to_string());
    }
    if landline_notation && is_mobile(digits) {
        return CleanResult::failure(format!(
            "invalid phone number '{}': hyphenated numbers must be landlines with an area code",
            raw
        ));
    }
    CleanResult::failure(format!(
        "invalid phone number '{}': {} digits is neither an 11-digit mobile nor a landline",
        raw,
        digits.len()
    ))
}

fn is_mobile(digits: &str) -> bool {
    let bytes = digits.as_bytes();
    bytes.len() == 11 && bytes[0] == b'1' && (b'3'..=b'9').contains(&bytes[1])
}

fn is_landline(digits: &str) -> bool {
    let Some(first) = digits.bytes().next() else {
        return false;
    };
    match digits.len() {
        7 | 8 => first != b'0' && first != b'1',
        10..=12 => first == b'0',
        _ => false,
    }
}
