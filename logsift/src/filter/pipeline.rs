use crossbeam_channel::{bounded, select, Receiver, SendTimeoutError, Sender};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

use super::cancel::Cancellation;
use super::matcher::Matcher;
use crate::errors::{SiftError, SiftResult};
use crate::metrics::FilterMetrics;
use crate::parser::{LineParser, RecordParser};
use crate::query::FilterNode;
use crate::record::{Record, RecordPool};

/// Output buffer of the single-threaded strategy
pub const SEQUENTIAL_OUTPUT_CAPACITY: usize = 100;

/// How long a blocked send waits before checking for cancellation again
const SEND_POLL: Duration = Duration::from_millis(50);

/// A strategy that turns a stream of lines into a stream of matched records.
///
/// The returned channel closes once the input is exhausted, the consumer
/// drops its end, or `cancel` fires.
pub trait LineFilter {
    fn filter(
        &self,
        cancel: &Cancellation,
        lines: Receiver<String>,
        tree: Arc<FilterNode>,
    ) -> Receiver<Record>;
}

#[derive(Debug, Clone, Copy)]
pub struct FilterOptions {
    pub workers: NonZeroUsize,
    /// Forward the records that do not match instead
    pub invert: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            invert: false,
        }
    }
}

pub(crate) fn default_workers() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

/// Parse, match and route one line. Shared by every strategy.
#[derive(Debug)]
struct Stage {
    pool: Arc<RecordPool>,
    parser: LineParser,
    matcher: Arc<Matcher>,
    metrics: FilterMetrics,
    invert: bool,
}

impl Stage {
    fn new(
        pool: Arc<RecordPool>,
        parser: LineParser,
        matcher: Arc<Matcher>,
        invert: bool,
    ) -> Self {
        Self {
            metrics: pool.metrics().clone(),
            pool,
            parser,
            matcher,
            invert,
        }
    }

    /// Returns the record to forward, or `None` once it has been dealt with
    fn process(&self, line: &str, sequence: u64, tree: &FilterNode) -> Option<Record> {
        let record = match self.parser.parse(line, sequence) {
            Ok(record) => record,
            Err(e) => {
                self.metrics.record_parse_error();
                debug!("Skipping line {}: {}", sequence, e);
                return None;
            }
        };

        if self.matcher.matches(&record, Some(tree)) != self.invert {
            self.metrics.record_match();
            Some(record)
        } else {
            self.pool.release(record);
            None
        }
    }

    /// Sends `record` downstream, releasing it if it cannot be delivered.
    ///
    /// Returns false when the worker should stop.
    fn forward(&self, cancel: &Cancellation, output: &Sender<Record>, record: Record) -> bool {
        let mut record = record;
        loop {
            if cancel.is_cancelled() {
                self.pool.release(record);
                return false;
            }
            match output.send_timeout(record, SEND_POLL) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(r)) => record = r,
                Err(SendTimeoutError::Disconnected(r)) => {
                    trace!("Output closed, dropping record {}", r.sequence);
                    self.pool.release(r);
                    return false;
                }
            }
        }
    }
}

/// Blocks for the next input item unless cancelled first
fn next<T>(cancel: &Cancellation, input: &Receiver<T>) -> Option<T> {
    if cancel.is_cancelled() {
        return None;
    }
    select! {
        recv(cancel.signal()) -> _ => None,
        recv(input) -> msg => msg.ok(),
    }
}

/// Single worker, records leave in input order
#[derive(Debug)]
pub struct SequentialFilter {
    stage: Arc<Stage>,
}

impl SequentialFilter {
    pub fn new(pool: Arc<RecordPool>, parser: LineParser, matcher: Arc<Matcher>) -> Self {
        Self::with_invert(pool, parser, matcher, false)
    }

    pub fn with_invert(
        pool: Arc<RecordPool>,
        parser: LineParser,
        matcher: Arc<Matcher>,
        invert: bool,
    ) -> Self {
        Self {
            stage: Arc::new(Stage::new(pool, parser, matcher, invert)),
        }
    }

    pub fn pool(&self) -> &Arc<RecordPool> {
        &self.stage.pool
    }
}

impl LineFilter for SequentialFilter {
    fn filter(
        &self,
        cancel: &Cancellation,
        lines: Receiver<String>,
        tree: Arc<FilterNode>,
    ) -> Receiver<Record> {
        let (tx, rx) = bounded(SEQUENTIAL_OUTPUT_CAPACITY);
        let stage = self.stage.clone();
        let cancel = cancel.clone();

        thread::spawn(move || {
            let mut sequence = 0u64;
            while let Some(line) = next(&cancel, &lines) {
                sequence += 1;
                stage.metrics.record_line();
                if let Some(record) = stage.process(&line, sequence, &tree) {
                    if !stage.forward(&cancel, &tx, record) {
                        break;
                    }
                }
            }
            debug!("Sequential filter finished after {} lines", sequence);
        });

        rx
    }
}

/// Fixed pool of workers pulling from one shared input channel.
///
/// Records leave in completion order; each still carries the sequence number
/// of its line.
pub struct ParallelFilter {
    stage: Arc<Stage>,
    workers: usize,
    threads: Arc<rayon::ThreadPool>,
}

impl ParallelFilter {
    pub fn new(
        pool: Arc<RecordPool>,
        parser: LineParser,
        matcher: Arc<Matcher>,
        options: FilterOptions,
    ) -> SiftResult<Self> {
        let workers = options.workers.get();
        let threads = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("logsift-worker-{}", i))
            .build()
            .map_err(|e| SiftError::config_error(format!("Failed to start workers: {}", e)))?;

        Ok(Self {
            stage: Arc::new(Stage::new(pool, parser, matcher, options.invert)),
            workers,
            threads: Arc::new(threads),
        })
    }

    pub fn pool(&self) -> &Arc<RecordPool> {
        &self.stage.pool
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Like [`LineFilter::filter`] over pre-batched lines.
    ///
    /// The first line of the stream gets `start_sequence`; every chunk takes a
    /// contiguous run of numbers in the order workers claim them.
    pub fn filter_chunks(
        &self,
        cancel: &Cancellation,
        chunks: Receiver<Vec<String>>,
        tree: Arc<FilterNode>,
        start_sequence: u64,
    ) -> Receiver<Record> {
        let handle = |stage: &Stage,
                      cancel: &Cancellation,
                      tx: &Sender<Record>,
                      tree: &FilterNode,
                      next_seq: &Mutex<u64>,
                      chunk: Vec<String>| {
            let first = {
                let mut seq = lock(next_seq);
                let first = *seq;
                *seq += chunk.len() as u64;
                first
            };
            stage.metrics.record_lines(chunk.len() as u64);

            for (offset, line) in chunk.iter().enumerate() {
                if cancel.is_cancelled() {
                    return false;
                }
                if let Some(record) = stage.process(line, first + offset as u64, tree) {
                    if !stage.forward(cancel, tx, record) {
                        return false;
                    }
                }
            }
            true
        };
        self.spawn(cancel, chunks, tree, start_sequence, handle)
    }

    /// Runs `handle` on every input item across the worker pool.
    ///
    /// A supervisor thread owns the pool scope; when it returns every worker
    /// has exited and the last output sender is gone.
    fn spawn<T, F>(
        &self,
        cancel: &Cancellation,
        input: Receiver<T>,
        tree: Arc<FilterNode>,
        start_sequence: u64,
        handle: F,
    ) -> Receiver<Record>
    where
        T: Send + 'static,
        F: Fn(&Stage, &Cancellation, &Sender<Record>, &FilterNode, &Mutex<u64>, T) -> bool
            + Send
            + Sync
            + 'static,
    {
        let (tx, rx) = bounded(self.workers * 2);
        let stage = self.stage.clone();
        let threads = self.threads.clone();
        let workers = self.workers;
        let cancel = cancel.clone();

        thread::spawn(move || {
            let next_seq = Mutex::new(start_sequence);
            threads.scope(|scope| {
                for id in 0..workers {
                    let stage: &Stage = &stage;
                    let tree: &FilterNode = &tree;
                    let (cancel, input, tx) = (&cancel, &input, tx.clone());
                    let (next_seq, handle) = (&next_seq, &handle);
                    scope.spawn(move |_| {
                        while let Some(item) = next(cancel, input) {
                            if !handle(stage, cancel, &tx, tree, next_seq, item) {
                                break;
                            }
                        }
                        trace!("Worker {} exiting", id);
                    });
                }
            });
            drop(tx);
            debug!("All {} workers finished", workers);
        });

        rx
    }
}

impl std::fmt::Debug for ParallelFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelFilter")
            .field("workers", &self.workers)
            .field("invert", &self.stage.invert)
            .finish()
    }
}

impl LineFilter for ParallelFilter {
    fn filter(
        &self,
        cancel: &Cancellation,
        lines: Receiver<String>,
        tree: Arc<FilterNode>,
    ) -> Receiver<Record> {
        let handle = |stage: &Stage,
                      cancel: &Cancellation,
                      tx: &Sender<Record>,
                      tree: &FilterNode,
                      next_seq: &Mutex<u64>,
                      line: String| {
            let sequence = {
                let mut seq = lock(next_seq);
                let sequence = *seq;
                *seq += 1;
                sequence
            };
            stage.metrics.record_line();

            match stage.process(&line, sequence, tree) {
                Some(record) => stage.forward(cancel, tx, record),
                None => true,
            }
        };
        self.spawn(cancel, lines, tree, 1, handle)
    }
}

fn lock(counter: &Mutex<u64>) -> std::sync::MutexGuard<'_, u64> {
    match counter.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
