use dashmap::DashMap;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

use crate::metrics::FilterMetrics;

/// Compiled regular expressions keyed by their effective pattern text.
///
/// The key includes the `(?i)` prefix added for case-insensitive lookups, so
/// the same pattern asked for with and without case folding occupies two
/// entries. Patterns that fail to compile are cached as `None` and never
/// retried.
#[derive(Debug, Default)]
pub struct RegexCache {
    entries: DashMap<String, Option<Arc<Regex>>>,
    metrics: FilterMetrics,
}

impl RegexCache {
    pub fn new() -> Self {
        Self::with_metrics(FilterMetrics::new())
    }

    pub fn with_metrics(metrics: FilterMetrics) -> Self {
        Self {
            entries: DashMap::new(),
            metrics,
        }
    }

    /// Returns the compiled form of `pattern`, or `None` if it is invalid
    pub fn get(&self, pattern: &str, case_insensitive: bool) -> Option<Arc<Regex>> {
        let key = if case_insensitive {
            format!("(?i){}", pattern)
        } else {
            pattern.to_string()
        };

        if let Some(entry) = self.entries.get(&key) {
            self.metrics.record_cache_lookup(true);
            return entry.clone();
        }

        self.metrics.record_cache_lookup(false);
        let compiled = match Regex::new(&key) {
            Ok(regex) => Some(Arc::new(regex)),
            Err(e) => {
                debug!("Invalid regex '{}' never matches: {}", pattern, e);
                None
            }
        };
        self.entries
            .entry(key)
            .or_insert(compiled)
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
