//! Lenient readers for loosely-typed provider JSON.
//!
//! Providers disagree on whether numbers arrive as JSON numbers or strings,
//! and fields come and go. These helpers return `None` rather than failing so
//! the caller can skip just the affected indicator.

use serde_json::{Map, Value};

/// Numeric value of a JSON number or numeric string. Non-finite is `None`.
pub fn as_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Text of a JSON string or number. Empty strings are `None`.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn field_f64(row: &Map<String, Value>, field: &str) -> Option<f64> {
    row.get(field).and_then(as_f64)
}

pub fn field_text(row: &Map<String, Value>, field: &str) -> Option<String> {
    row.get(field).and_then(as_text)
}

/// Numeric text from a string field, as in `"4.3"`.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_and_numeric_strings() {
        assert_eq!(as_f64(&json!(4.5)), Some(4.5));
        assert_eq!(as_f64(&json!(" 12 ")), Some(12.0));
        assert_eq!(as_f64(&json!("n/a")), None);
        assert_eq!(as_f64(&json!(null)), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn text_fields() {
        let row = json!({"year": 2022, "name": "Lowell", "blank": ""});
        let row = row.as_object().unwrap();
        assert_eq!(field_text(row, "year").as_deref(), Some("2022"));
        assert_eq!(field_text(row, "name").as_deref(), Some("Lowell"));
        assert_eq!(field_text(row, "blank"), None);
        assert_eq!(field_text(row, "missing"), None);
    }
}
