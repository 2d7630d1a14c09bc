use std::sync::Arc;
use tracing::trace;

use super::{JsonParser, KeyValueParser, RecordParser};
use crate::errors::ParseError;
use crate::record::{Record, RecordPool};

/// Detects the dialect of each line on its own
#[derive(Debug)]
pub struct AutoParser {
    pool: Arc<RecordPool>,
    json: JsonParser,
    key_value: KeyValueParser,
}

impl AutoParser {
    pub fn new(pool: Arc<RecordPool>) -> Self {
        Self {
            json: JsonParser::new(pool.clone()),
            key_value: KeyValueParser::new(pool.clone()),
            pool,
        }
    }

    fn bare(&self, line: &str, sequence: u64) -> Record {
        let mut record = self.pool.acquire();
        record.raw.push_str(line);
        record.sequence = sequence;
        record
    }
}

impl RecordParser for AutoParser {
    fn parse(&self, line: &str, sequence: u64) -> Result<Record, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(self.bare(line, sequence));
        }

        if self.json.can_handle(line) {
            match self.json.parse(line, sequence) {
                Ok(record) => return Ok(record),
                Err(e) => trace!("Line {} is not JSON, trying key=value: {}", sequence, e),
            }
        }

        if self.key_value.can_handle(line) {
            return self.key_value.parse(line, sequence);
        }

        Ok(self.bare(line, sequence))
    }

    fn can_handle(&self, _line: &str) -> bool {
        true
    }
}
