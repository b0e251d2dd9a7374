//! Field cleaners.
//!
//! Five stateless strategies, one per [`ColumnType`]. Each is a pure
//! function from a raw cell to a [`CleanResult`]; empty cells are a trivial
//! success carrying the empty value.
//!
//! | Type | Output |
//! |------|--------|
//! | phone | digits, optionally `+`-prefixed for foreign numbers |
//! | date | `YYYY-MM-DD` |
//! | address | [`AddressParts`], rendered as one normalized string |
//! | number | `f64` (`None` when empty) |
//! | text | trimmed string |

pub mod address;
pub mod date;
pub mod number;
pub mod phone;
pub mod text;

pub use address::{clean_address, AddressParts};
pub use date::clean_date;
pub use number::clean_number;
pub use phone::clean_phone;
pub use text::clean_text;

use serde_json::{Number, Value};

use crate::models::{CleanResult, ColumnType};

/// A cleaner working on JSON cell values, as the row engine sees them.
pub trait FieldCleaner: Send + Sync {
    fn clean(&self, value: &Value) -> CleanResult<Value>;
}

/// The built-in cleaner for a column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardCleaner(pub ColumnType);

impl FieldCleaner for StandardCleaner {
    fn clean(&self, value: &Value) -> CleanResult<Value> {
        clean_value(self.0, value)
    }
}

/// Accepts every value unchanged apart from trimming strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassThrough;

impl FieldCleaner for PassThrough {
    fn clean(&self, value: &Value) -> CleanResult<Value> {
        match value {
            Value::String(s) => CleanResult::success(Value::String(s.trim().to_string())),
            other => CleanResult::success(other.clone()),
        }
    }
}

/// Run the built-in cleaner for `column_type` and convert its output to JSON.
pub fn clean_value(column_type: ColumnType, value: &Value) -> CleanResult<Value> {
    match column_type {
        ColumnType::Phone => clean_phone(value).map(Value::String),
        ColumnType::Date => clean_date(value).map(Value::String),
        ColumnType::Address => clean_address(value).map(|parts| Value::String(parts.to_string())),
        ColumnType::Number => clean_number(value).map(number_to_value),
        ColumnType::Text => clean_text(value).map(Value::String),
    }
}

/// Whether a non-empty sample value has the shape of `column_type`.
pub fn matches_type(column_type: ColumnType, value: &Value) -> bool {
    !is_blank(value) && clean_value(column_type, value).is_success()
}

/// Null or whitespace-only.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Cell content as trimmed text.
///
/// `Ok(None)` for empty cells, `Err` for values no cleaner can read
/// (arrays and objects).
pub(crate) fn cell_text(value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Value::Number(n) => Ok(Some(number_text(n))),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Array(_) | Value::Object(_) => Err("unsupported value: expected a scalar cell".to_string()),
    }
}

/// Largest magnitude below which every whole `f64` is exact.
const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

/// Whole floats print without a trailing `.0`.
fn number_text(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < MAX_EXACT => (f as i64).to_string(),
        _ => n.to_string(),
    }
}

/// Whole numbers become JSON integers, everything else a float.
fn number_to_value(number: Option<f64>) -> Value {
    match number {
        None => Value::String(String::new()),
        Some(n) if n.fract() == 0.0 && n.abs() < MAX_EXACT => Value::from(n as i64),
        Some(n) => Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clean_value_dispatch() {
        assert_eq!(
            clean_value(ColumnType::Phone, &json!("138 1234 5678")),
            CleanResult::success(json!("13812345678"))
        );
        assert_eq!(
            clean_value(ColumnType::Date, &json!("2023年8月5日")),
            CleanResult::success(json!("2023-08-05"))
        );
        assert_eq!(
            clean_value(ColumnType::Number, &json!("1,234")),
            CleanResult::success(json!(1234))
        );
        assert_eq!(
            clean_value(ColumnType::Number, &json!("1,234.5")),
            CleanResult::success(json!(1234.5))
        );
        assert_eq!(
            clean_value(ColumnType::Text, &json!("  hi ")),
            CleanResult::success(json!("hi"))
        );
    }

    #[test]
    fn test_empty_is_trivial_success_for_every_type() {
        for ty in [
            ColumnType::Phone,
            ColumnType::Date,
            ColumnType::Address,
            ColumnType::Number,
            ColumnType::Text,
        ] {
            assert!(clean_value(ty, &json!("  ")).is_success(), "{ty}");
            assert!(clean_value(ty, &Value::Null).is_success(), "{ty}");
            assert!(!matches_type(ty, &json!("")), "{ty}");
        }
    }

    #[test]
    fn test_idempotence() {
        let cases = [
            (ColumnType::Phone, json!("+86 138 1234 5678")),
            (ColumnType::Phone, json!("(010) 8765 4321")),
            (ColumnType::Phone, json!("+1 415 555 0100")),
            (ColumnType::Date, json!("2024/2/29 10:00")),
            (ColumnType::Date, json!(45000)),
            (ColumnType::Date, json!("1700000000")),
            (ColumnType::Address, json!("广东 深圳市 南山区 科技园路1号")),
            (ColumnType::Address, json!("北京市朝阳区建国路88号")),
            (ColumnType::Number, json!(" ¥12,345.50 ")),
            (ColumnType::Text, json!("  张三 ")),
        ];
        for (ty, raw) in cases {
            let first = clean_value(ty, &raw);
            let value = first.value().cloned().unwrap_or_else(|| panic!("{ty} {raw}"));
            let second = clean_value(ty, &value);
            assert_eq!(second.value(), Some(&value), "{ty} {raw}");
        }
    }

    #[test]
    fn test_pass_through() {
        assert_eq!(PassThrough.clean(&json!(" 138-x ")), CleanResult::success(json!("138-x")));
        assert_eq!(PassThrough.clean(&json!(5)), CleanResult::success(json!(5)));
    }

    #[test]
    fn test_cell_text_rejects_structures() {
        assert!(cell_text(&json!([1, 2])).is_err());
        assert_eq!(cell_text(&json!(12)).unwrap().as_deref(), Some("12"));
        assert_eq!(cell_text(&json!("  ")).unwrap(), None);
    }

    #[test]
    fn test_cell_text_whole_floats() {
        assert_eq!(cell_text(&json!(13812345678.0)).unwrap().as_deref(), Some("13812345678"));
        assert_eq!(cell_text(&json!(-3.0)).unwrap().as_deref(), Some("-3"));
        assert_eq!(cell_text(&json!(2.5)).unwrap().as_deref(), Some("2.5"));
        assert_eq!(cell_text(&json!(1e300)).unwrap().as_deref(), Some(json!(1e300).to_string().as_str()));
    }
}
