use std::sync::Arc;

use super::RecordParser;
use crate::errors::ParseError;
use crate::record::{Record, RecordPool};
use crate::value::Value;

/// Parses `key=value` lines such as `level=error msg="disk full" user.id=7`
#[derive(Debug)]
pub struct KeyValueParser {
    pool: Arc<RecordPool>,
}

impl KeyValueParser {
    pub fn new(pool: Arc<RecordPool>) -> Self {
        Self { pool }
    }
}

impl RecordParser for KeyValueParser {
    fn parse(&self, line: &str, sequence: u64) -> Result<Record, ParseError> {
        let mut record = self.pool.acquire();
        record.raw.push_str(line);
        record.sequence = sequence;

        for (key, value) in pairs(line) {
            record.fields.insert(key.to_string(), Value::infer_no_null(value));
        }
        Ok(record)
    }

    fn can_handle(&self, line: &str) -> bool {
        line.contains('=') && !line.trim_start().starts_with('{')
    }
}

/// Splits a line into its key/value slices.
///
/// Tokens without `=` are skipped up to the next whitespace. Quoted values
/// may contain whitespace and `\"`; the slice keeps the escape backslashes.
fn pairs(line: &str) -> Vec<(&str, &str)> {
    let bytes = line.as_bytes();
    let n = bytes.len();
    let mut out = Vec::new();
    let mut i = 0;

    while i < n {
        while i < n && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= n {
            break;
        }

        let key_start = i;
        while i < n && bytes[i] != b'=' && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= n || bytes[i] != b'=' {
            while i < n && !bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            continue;
        }

        let key = &line[key_start..i];
        i += 1;

        if i >= n {
            out.push((key, ""));
            break;
        }

        let value = if bytes[i] == b'"' {
            i += 1;
            let value_start = i;
            while i < n && bytes[i] != b'"' {
                if bytes[i] == b'\\' && i + 1 < n {
                    i += 1;
                }
                i += 1;
            }
            let value = &line[value_start..i.min(n)];
            if i < n {
                i += 1;
            }
            value
        } else {
            let value_start = i;
            while i < n && !bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            &line[value_start..i]
        };

        out.push((key, value));
    }

    out
}
