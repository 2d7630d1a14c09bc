use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A dynamically typed field value taken from a log line or a query literal.
///
/// Every comparison in the matcher goes through [`Value::render`] or
/// [`Value::as_f64`], both of which match exhaustively, so adding a variant
/// forces every comparison site to be revisited.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Infers a typed value from literal text.
    ///
    /// Order: base-10 integer, float, boolean, `null`/`nil`, then string.
    /// Quoted query literals go through this as well, so `"500"` becomes 500.
    pub fn infer(text: &str) -> Value {
        match infer_scalar(text) {
            Some(value) => value,
            None => match text.to_ascii_lowercase().as_str() {
                "null" | "nil" => Value::Null,
                _ => Value::String(text.to_string()),
            },
        }
    }

    /// Like [`Value::infer`] but never produces `Null`; used for key=value lines.
    pub fn infer_no_null(text: &str) -> Value {
        infer_scalar(text).unwrap_or_else(|| Value::String(text.to_string()))
    }

    /// Renders the value the way comparisons see it.
    ///
    /// Floats use the shortest representation that round-trips (`2.0` renders
    /// as `2`), null renders as the empty string, containers as compact JSON.
    pub fn render(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            Value::Array(_) | Value::Object(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.parse::<f64>().ok(),
            Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

fn infer_scalar(text: &str) -> Option<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Int(i));
    }
    if let Ok(f) = text.parse::<f64>() {
        return Some(Value::Float(f));
    }
    if text.eq_ignore_ascii_case("true") {
        return Some(Value::Bool(true));
    }
    if text.eq_ignore_ascii_case("false") {
        return Some(Value::Bool(false));
    }
    None
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_order() {
        assert_eq!(Value::infer("500"), Value::Int(500));
        assert_eq!(Value::infer("-12"), Value::Int(-12));
        assert_eq!(Value::infer("85.5"), Value::Float(85.5));
        assert_eq!(Value::infer("TRUE"), Value::Bool(true));
        assert_eq!(Value::infer("False"), Value::Bool(false));
        assert_eq!(Value::infer("nil"), Value::Null);
        assert_eq!(Value::infer("NULL"), Value::Null);
        assert_eq!(Value::infer("error"), Value::from("error"));
        assert_eq!(Value::infer(""), Value::from(""));
    }

    #[test]
    fn test_infer_no_null_keeps_text() {
        assert_eq!(Value::infer_no_null("null"), Value::from("null"));
        assert_eq!(Value::infer_no_null("42"), Value::Int(42));
    }

    #[test]
    fn test_render() {
        assert_eq!(Value::Int(500).render(), "500");
        assert_eq!(Value::Float(2.0).render(), "2");
        assert_eq!(Value::Float(0.25).render(), "0.25");
        assert_eq!(Value::Bool(true).render(), "true");
        assert_eq!(Value::Null.render(), "");

        let mut map = BTreeMap::new();
        map.insert("role".to_string(), Value::from("admin"));
        assert_eq!(Value::Object(map).render(), r#"{"role":"admin"}"#);
        assert_eq!(
            Value::Array(vec![Value::Int(1), Value::Null]).render(),
            "[1,null]"
        );
    }

    #[test]
    fn test_as_f64() {
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::from("8080").as_f64(), Some(8080.0));
        assert_eq!(Value::from("abc").as_f64(), None);
        // Surrounding whitespace keeps a string from counting as a number
        assert_eq!(Value::from(" 50").as_f64(), None);
        assert_eq!(Value::from("50 ").as_f64(), None);
        assert_eq!(Value::Bool(true).as_f64(), None);
        assert_eq!(Value::Null.as_f64(), None);
    }

    #[test]
    fn test_from_json_numbers() {
        let json: serde_json::Value = serde_json::from_str(r#"[500, 1.5, 18446744073709551615]"#).unwrap();
        let Value::Array(items) = Value::from(json) else {
            panic!("expected array");
        };
        assert_eq!(items[0], Value::Int(500));
        assert_eq!(items[1], Value::Float(1.5));
        assert!(matches!(items[2], Value::Float(_)));
    }
}
