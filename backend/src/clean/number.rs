//! Numeric cleaning: thousands separators and currency signs are dropped,
//! the remainder must parse as a finite float.

use serde_json::Value;

use super::cell_text;
use crate::models::CleanResult;

const THOUSANDS_SEPARATORS: [char; 2] = [',', '，'];
const CURRENCY_SIGNS: [char; 3] = ['¥', '￥', '$'];

/// Clean a numeric cell. `None` is the empty value.
pub fn clean_number(value: &Value) -> CleanResult<Option<f64>> {
    if let Value::Number(n) = value {
        return match n.as_f64() {
            Some(f) if f.is_finite() => CleanResult::success(Some(f)),
            _ => CleanResult::failure(format!("number '{}' is out of range", n)),
        };
    }

    let raw = match cell_text(value) {
        Ok(Some(raw)) => raw,
        Ok(None) => return CleanResult::success(None),
        Err(e) => return CleanResult::failure(e),
    };

    let stripped: String = raw.chars().filter(|c| !THOUSANDS_SEPARATORS.contains(c)).collect();
    let (sign, body) = match stripped.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", stripped.strip_prefix('+').unwrap_or(&stripped)),
    };
    let body = body.trim_start_matches(&CURRENCY_SIGNS[..]).trim();

    match format!("{}{}", sign, body).parse::<f64>() {
        Ok(n) if n.is_finite() && body.chars().any(|c| c.is_ascii_digit()) => CleanResult::success(Some(n)),
        _ => CleanResult::failure(format!("'{}' is not a number", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn num(raw: &str) -> Option<f64> {
        clean_number(&json!(raw)).into_value().flatten()
    }

    #[test]
    fn test_plain_and_separated() {
        assert_eq!(num("42"), Some(42.0));
        assert_eq!(num(" 1,234,567.89 "), Some(1234567.89));
        assert_eq!(num("1，000"), Some(1000.0));
        assert_eq!(num("-3.5"), Some(-3.5));
        assert_eq!(num("1e3"), Some(1000.0));
    }

    #[test]
    fn test_currency_sign() {
        assert_eq!(num("¥12,345.50"), Some(12345.5));
        assert_eq!(num("-$20"), Some(-20.0));
    }

    #[test]
    fn test_rejects_non_numeric() {
        assert!(!clean_number(&json!("12abc")).is_success());
        assert!(!clean_number(&json!("abc")).is_success());
        assert!(!clean_number(&json!("inf")).is_success());
        assert!(!clean_number(&json!("NaN")).is_success());
        assert!(!clean_number(&json!("¥")).is_success());
    }

    #[test]
    fn test_json_number_and_empty() {
        assert_eq!(clean_number(&json!(7.25)).into_value(), Some(Some(7.25)));
        assert_eq!(clean_number(&json!("")).into_value(), Some(None));
    }
}
