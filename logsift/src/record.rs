use std::collections::HashMap;
use std::sync::Mutex;
use tracing::trace;

use crate::metrics::FilterMetrics;
use crate::value::Value;

/// Free records kept by a pool unless told otherwise
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

/// One parsed log line.
///
/// `fields` holds flattened dot-path keys. `sequence` is the 1-based line
/// number within its source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub raw: String,
    pub fields: HashMap<String, Value>,
    pub sequence: u64,
}

impl Record {
    pub fn new(raw: impl Into<String>, sequence: u64) -> Self {
        Self {
            raw: raw.into(),
            fields: HashMap::new(),
            sequence,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Resets the record while keeping its allocations
    pub fn clear(&mut self) {
        self.raw.clear();
        self.fields.clear();
        self.sequence = 0;
    }
}

/// A bounded free list of [`Record`]s.
///
/// Records move out of the pool on [`acquire`](RecordPool::acquire) and back
/// in on [`release`](RecordPool::release). Release takes the record by value,
/// so no reference to it can survive the call. Every acquired record is
/// cleared, whatever state it was released in.
#[derive(Debug)]
pub struct RecordPool {
    free: Mutex<Vec<Record>>,
    capacity: usize,
    metrics: FilterMetrics,
}

impl RecordPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_POOL_CAPACITY, FilterMetrics::new())
    }

    pub fn with_capacity(capacity: usize, metrics: FilterMetrics) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity.min(DEFAULT_POOL_CAPACITY))),
            capacity,
            metrics,
        }
    }

    /// Takes a cleared record from the pool, allocating when it is empty
    pub fn acquire(&self) -> Record {
        let reused = match self.free.lock() {
            Ok(mut free) => free.pop(),
            Err(poisoned) => poisoned.into_inner().pop(),
        };
        self.metrics.record_acquire(reused.is_some());
        match reused {
            Some(mut record) => {
                record.clear();
                record
            }
            None => Record::default(),
        }
    }

    /// Returns a record to the pool; dropped if the pool is full
    pub fn release(&self, record: Record) {
        let mut free = match self.free.lock() {
            Ok(free) => free,
            Err(poisoned) => poisoned.into_inner(),
        };
        if free.len() < self.capacity {
            free.push(record);
        } else {
            trace!("Record pool full, dropping record {}", record.sequence);
        }
    }

    /// Number of records currently waiting for reuse
    pub fn available(&self) -> usize {
        match self.free.lock() {
            Ok(free) => free.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn metrics(&self) -> &FilterMetrics {
        &self.metrics
    }
}

impl Default for RecordPool {
    fn default() -> Self {
        Self::new()
    }
}
