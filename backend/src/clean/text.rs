//! Text cleaning: trim, never fails.

use serde_json::Value;

use super::number_text;
use crate::models::CleanResult;

pub fn clean_text(value: &Value) -> CleanResult<String> {
    let text = match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => number_text(n),
        other => other.to_string(),
    };
    CleanResult::success(text)
}
