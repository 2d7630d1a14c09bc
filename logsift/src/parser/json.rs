use std::collections::HashMap;
use std::sync::Arc;

use super::RecordParser;
use crate::errors::ParseError;
use crate::record::{Record, RecordPool};
use crate::value::Value;

/// Parses JSON object lines and flattens them into dot-path fields
#[derive(Debug)]
pub struct JsonParser {
    pool: Arc<RecordPool>,
}

impl JsonParser {
    pub fn new(pool: Arc<RecordPool>) -> Self {
        Self { pool }
    }
}

impl RecordParser for JsonParser {
    fn parse(&self, line: &str, sequence: u64) -> Result<Record, ParseError> {
        let mut record = self.pool.acquire();
        record.sequence = sequence;

        let object = match serde_json::from_str::<serde_json::Value>(line) {
            Ok(serde_json::Value::Object(object)) => object,
            Ok(_) => {
                self.pool.release(record);
                return Err(ParseError::NotAnObject { sequence });
            }
            Err(source) => {
                self.pool.release(record);
                return Err(ParseError::Json { sequence, source });
            }
        };

        record.raw.push_str(line);
        for (key, value) in object {
            flatten_into(&key, Value::from(value), &mut record.fields);
        }
        Ok(record)
    }

    fn can_handle(&self, line: &str) -> bool {
        line.trim_start().starts_with('{')
    }
}

/// Stores `value` at `path`, plus every nested leaf under `path.key`.
///
/// Objects are kept at their own path too so `user?` works alongside
/// `user.id:7`. Arrays are stored as-is; object elements are additionally
/// flattened under `path[index]`.
pub(crate) fn flatten_into(path: &str, value: Value, fields: &mut HashMap<String, Value>) {
    match value {
        Value::Object(ref map) => {
            for (key, child) in map {
                flatten_into(&format!("{}.{}", path, key), child.clone(), fields);
            }
            fields.insert(path.to_string(), value);
        }
        Value::Array(ref items) => {
            for (index, item) in items.iter().enumerate() {
                if let Value::Object(map) = item {
                    let prefix = format!("{}[{}]", path, index);
                    for (key, child) in map {
                        flatten_into(&format!("{}.{}", prefix, key), child.clone(), fields);
                    }
                }
            }
            fields.insert(path.to_string(), value);
        }
        scalar => {
            fields.insert(path.to_string(), scalar);
        }
    }
}
