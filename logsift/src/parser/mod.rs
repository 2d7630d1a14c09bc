//! Turning raw log lines into flattened [`Record`]s.
//!
//! Two dialects are understood:
//!
//! ```text
//! {"level":"error","user":{"id":7}}          JSON object, nested keys flattened to user.id
//! level=error msg="disk full" took=1.5       whitespace separated key=value pairs
//! ```
//!
//! [`AutoParser`] tries JSON first, then key=value, and falls back to a record
//! with no fields, so it never fails. [`LineParser`] is the closed set of
//! parsers a run can be configured with.

pub mod auto;
pub mod json;
pub mod keyvalue;

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::{ParseError, SiftError};
use crate::record::{Record, RecordPool};

pub use auto::AutoParser;
pub use json::JsonParser;
pub use keyvalue::KeyValueParser;

/// Capability shared by every line dialect
pub trait RecordParser: Send + Sync {
    /// Parses one line into a record carrying `sequence`
    fn parse(&self, line: &str, sequence: u64) -> Result<Record, ParseError>;

    /// Cheap check whether this parser is worth trying on `line`
    fn can_handle(&self, line: &str) -> bool;
}

/// Input dialect selected by configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Auto,
    Json,
    #[serde(alias = "kv", alias = "logfmt")]
    KeyValue,
}

impl FromStr for LogFormat {
    type Err = SiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(LogFormat::Auto),
            "json" => Ok(LogFormat::Json),
            "keyvalue" | "kv" | "logfmt" => Ok(LogFormat::KeyValue),
            other => Err(SiftError::config_error(format!(
                "Unknown log format '{}'. Valid formats are: auto, json, keyvalue",
                other
            ))),
        }
    }
}

/// Dispatcher over the supported dialects
#[derive(Debug)]
pub enum LineParser {
    Json(JsonParser),
    KeyValue(KeyValueParser),
    Auto(AutoParser),
}

impl LineParser {
    pub fn new(format: LogFormat, pool: Arc<RecordPool>) -> Self {
        match format {
            LogFormat::Json => LineParser::Json(JsonParser::new(pool)),
            LogFormat::KeyValue => LineParser::KeyValue(KeyValueParser::new(pool)),
            LogFormat::Auto => LineParser::Auto(AutoParser::new(pool)),
        }
    }
}

impl RecordParser for LineParser {
    fn parse(&self, line: &str, sequence: u64) -> Result<Record, ParseError> {
        match self {
            LineParser::Json(p) => p.parse(line, sequence),
            LineParser::KeyValue(p) => p.parse(line, sequence),
            LineParser::Auto(p) => p.parse(line, sequence),
        }
    }

    fn can_handle(&self, line: &str) -> bool {
        match self {
            LineParser::Json(p) => p.can_handle(line),
            LineParser::KeyValue(p) => p.can_handle(line),
            LineParser::Auto(p) => p.can_handle(line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("auto".parse::<LogFormat>().unwrap(), LogFormat::Auto);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("kv".parse::<LogFormat>().unwrap(), LogFormat::KeyValue);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_dispatch_by_format() {
        let pool = Arc::new(RecordPool::new());

        let json = LineParser::new(LogFormat::Json, pool.clone());
        assert!(json.parse("level=error", 1).is_err());

        let kv = LineParser::new(LogFormat::KeyValue, pool.clone());
        let record = kv.parse("level=error", 1).unwrap();
        assert_eq!(record.get("level"), Some(&Value::from("error")));

        let auto = LineParser::new(LogFormat::Auto, pool);
        assert!(auto.can_handle("anything at all"));
        let record = auto.parse(r#"{"level":"warn"}"#, 2).unwrap();
        assert_eq!(record.get("level"), Some(&Value::from("warn")));
        assert_eq!(record.sequence, 2);
    }
}
