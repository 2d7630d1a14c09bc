use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::str::FromStr;

use crate::errors::SiftError;
use crate::record::Record;
use crate::value::Value;

/// Placeholder printed for a requested field the record lacks
pub const MISSING_FIELD: &str = "-";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// The line exactly as read
    #[default]
    Raw,
    Json,
    /// Tab separated field values
    Fields,
    /// One `key: value` line per field under a line-number header
    Pretty,
}

impl FromStr for OutputFormat {
    type Err = SiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(OutputFormat::Raw),
            "json" => Ok(OutputFormat::Json),
            "fields" => Ok(OutputFormat::Fields),
            "pretty" => Ok(OutputFormat::Pretty),
            other => Err(SiftError::config_error(format!(
                "Unknown output format '{}' (expected raw, json, fields or pretty)",
                other
            ))),
        }
    }
}

/// Renders records as text in one [`OutputFormat`].
///
/// A non-empty field list narrows every format except raw to those fields,
/// in the order given. Raw with a field list behaves like fields.
#[derive(Debug, Clone, Default)]
pub struct Formatter {
    format: OutputFormat,
    fields: Vec<String>,
    color: bool,
}

impl Formatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            fields: Vec::new(),
            color: false,
        }
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn render(&self, record: &Record) -> io::Result<String> {
        match self.format {
            OutputFormat::Raw if self.fields.is_empty() => Ok(record.raw.clone()),
            OutputFormat::Raw | OutputFormat::Fields => Ok(self.render_fields(record)),
            OutputFormat::Json => self.render_json(record),
            OutputFormat::Pretty => Ok(self.render_pretty(record)),
        }
    }

    fn render_fields(&self, record: &Record) -> String {
        if self.fields.is_empty() {
            return sorted(record)
                .into_iter()
                .map(|(k, v)| format!("{}={}", k, v.render()))
                .collect::<Vec<_>>()
                .join("\t");
        }

        self.fields
            .iter()
            .map(|name| match record.get(name) {
                Some(value) => value.render(),
                None => MISSING_FIELD.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\t")
    }

    fn render_json(&self, record: &Record) -> io::Result<String> {
        if self.fields.is_empty() {
            // JSON lines pass through untouched
            if record.raw.trim_start().starts_with('{') && !record.fields.is_empty() {
                return Ok(record.raw.clone());
            }
            return Ok(serde_json::to_string(&sorted(record))?);
        }

        let picked: BTreeMap<&str, &Value> = self
            .fields
            .iter()
            .filter_map(|name| record.get(name).map(|v| (name.as_str(), v)))
            .collect();
        Ok(serde_json::to_string(&picked)?)
    }

    fn render_pretty(&self, record: &Record) -> String {
        let header = format!("line {}", record.sequence);
        let mut out = if self.color {
            header.bold().cyan().to_string()
        } else {
            header
        };

        let entries: Vec<(&str, Option<&Value>)> = if self.fields.is_empty() {
            sorted(record).into_iter().map(|(k, v)| (k, Some(v))).collect()
        } else {
            self.fields
                .iter()
                .map(|name| (name.as_str(), record.get(name)))
                .collect()
        };

        if entries.is_empty() {
            out.push_str("\n  ");
            out.push_str(&record.raw);
            return out;
        }

        for (key, value) in entries {
            let value = value.map_or_else(|| MISSING_FIELD.to_string(), Value::render);
            out.push_str("\n  ");
            if self.color {
                out.push_str(&format!("{}: {}", key.green(), value));
            } else {
                out.push_str(&format!("{}: {}", key, value));
            }
        }
        out
    }
}

fn sorted(record: &Record) -> BTreeMap<&str, &Value> {
    record
        .fields
        .iter()
        .map(|(k, v)| (k.as_str(), v))
        .collect()
}

/// Writes formatted records, stopping at an optional limit.
#[derive(Debug)]
pub struct Writer<W: Write> {
    out: W,
    formatter: Formatter,
    limit: Option<u64>,
    count_only: bool,
    count: u64,
}

impl<W: Write> Writer<W> {
    pub fn new(out: W, formatter: Formatter) -> Self {
        Self {
            out,
            formatter,
            limit: None,
            count_only: false,
            count: 0,
        }
    }

    /// Stops after `limit` records; `Some(0)` means no limit
    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit.filter(|&n| n > 0);
        self
    }

    /// Count records without printing them; [`finish`](Self::finish) prints the total
    pub fn count_only(mut self, count_only: bool) -> Self {
        self.count_only = count_only;
        self
    }

    /// Writes one record and returns whether more are wanted.
    ///
    /// The record that reaches the limit is still written; once it has been
    /// reached nothing more is written and `false` is returned.
    pub fn write(&mut self, record: &Record) -> io::Result<bool> {
        if self.is_full() {
            return Ok(false);
        }

        if !self.count_only {
            let line = self.formatter.render(record)?;
            writeln!(self.out, "{}", line)?;
        }
        self.count += 1;
        Ok(!self.is_full())
    }

    pub fn is_full(&self) -> bool {
        self.limit.is_some_and(|limit| self.count >= limit)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Prints the total in count-only mode, then flushes
    pub fn finish(&mut self) -> io::Result<()> {
        if self.count_only {
            writeln!(self.out, "{}", self.count)?;
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
