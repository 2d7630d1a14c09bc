use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Counters shared by every worker of a run.
///
/// Cloning is cheap and every clone observes the same counters.
#[derive(Debug, Clone)]
pub struct FilterMetrics {
    // Line counters
    total_lines: Arc<AtomicU64>,
    matched_lines: Arc<AtomicU64>,
    parse_errors: Arc<AtomicU64>,

    // Regex cache
    cache_hits: Arc<AtomicU64>,
    cache_misses: Arc<AtomicU64>,

    // Record pool
    records_reused: Arc<AtomicU64>,
    records_allocated: Arc<AtomicU64>,
}

impl FilterMetrics {
    pub fn new() -> Self {
        Self {
            total_lines: Arc::new(AtomicU64::new(0)),
            matched_lines: Arc::new(AtomicU64::new(0)),
            parse_errors: Arc::new(AtomicU64::new(0)),
            cache_hits: Arc::new(AtomicU64::new(0)),
            cache_misses: Arc::new(AtomicU64::new(0)),
            records_reused: Arc::new(AtomicU64::new(0)),
            records_allocated: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn record_line(&self) {
        self.total_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lines(&self, count: u64) {
        self.total_lines.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_match(&self) {
        self.matched_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_error(&self) {
        let total = self.parse_errors.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Parse errors so far: {}", total);
    }

    /// Records a regex cache lookup
    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a record pool acquisition
    pub fn record_acquire(&self, reused: bool) {
        if reused {
            self.records_reused.fetch_add(1, Ordering::Relaxed);
        } else {
            self.records_allocated.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    /// Snapshot of all counters
    pub fn get_stats(&self) -> FilterStats {
        FilterStats {
            total_lines: self.total_lines.load(Ordering::Relaxed),
            matched_lines: self.matched_lines.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            records_reused: self.records_reused.load(Ordering::Relaxed),
            records_allocated: self.records_allocated.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Filter stats:\n\
             Lines (total/matched/parse errors): {}/{}/{}\n\
             Regex cache hits/misses: {}/{}\n\
             Records reused/allocated: {}/{}",
            stats.total_lines,
            stats.matched_lines,
            stats.parse_errors,
            stats.cache_hits,
            stats.cache_misses,
            stats.records_reused,
            stats.records_allocated
        );
    }
}

impl Default for FilterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`FilterMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub total_lines: u64,
    pub matched_lines: u64,
    pub parse_errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub records_reused: u64,
    pub records_allocated: u64,
}

impl FilterStats {
    /// Lines per second over `elapsed`, or zero for an empty run
    pub fn rate(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if self.total_lines == 0 || secs == 0.0 {
            0.0
        } else {
            self.total_lines as f64 / secs
        }
    }
}
