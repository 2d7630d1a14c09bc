use crossbeam_channel::Receiver;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::SiftConfig;
use crate::errors::{SiftError, SiftResult};
use crate::filter::{
    Cancellation, FilterOptions, LineFilter, Matcher, ParallelFilter, SequentialFilter,
};
use crate::metrics::{FilterMetrics, FilterStats};
use crate::output::Writer;
use crate::parser::LineParser;
use crate::query::QueryParser;
use crate::record::{Record, RecordPool, DEFAULT_POOL_CAPACITY};
use crate::source::{LineReader, STDIN_PATH};

/// What a finished run did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiftSummary {
    pub stats: FilterStats,
    pub duration: Duration,
    /// Sources that could not be read to the end
    pub sources_failed: usize,
    /// The run was stopped by its cancellation token; stats cover the work done
    pub cancelled: bool,
}

enum Strategy {
    Sequential(SequentialFilter),
    Parallel(ParallelFilter),
}

/// Filters every source in `config.files` (stdin when empty) into `writer`.
///
/// Sources are processed one after another and each numbers its lines from 1.
/// A source that fails to open or read is logged and skipped. An invalid
/// query or a failing writer is an error. Cancellation stops the run early
/// but still returns a summary, with [`SiftSummary::cancelled`] set.
pub fn sift<W: Write>(
    config: &SiftConfig,
    cancel: &Cancellation,
    writer: &mut Writer<W>,
) -> SiftResult<SiftSummary> {
    let start = Instant::now();
    let tree = Arc::new(QueryParser.parse(&config.query)?);
    debug!("Parsed filter: {:?}", tree);

    let metrics = FilterMetrics::new();
    let pool = Arc::new(RecordPool::with_capacity(
        DEFAULT_POOL_CAPACITY,
        metrics.clone(),
    ));
    let matcher = Arc::new(Matcher::with_metrics(config.ignore_case, metrics.clone()));
    let parser = LineParser::new(config.format, pool.clone());

    let strategy = if config.jobs.get() == 1 {
        Strategy::Sequential(SequentialFilter::with_invert(
            pool.clone(),
            parser,
            matcher,
            config.invert,
        ))
    } else {
        let options = FilterOptions {
            workers: config.jobs,
            invert: config.invert,
        };
        Strategy::Parallel(ParallelFilter::new(pool.clone(), parser, matcher, options)?)
    };

    let files = if config.files.is_empty() {
        vec![PathBuf::from(STDIN_PATH)]
    } else {
        config.files.clone()
    };

    let reader = LineReader::new();
    let mut sources_failed = 0;
    for path in &files {
        if writer.is_full() {
            debug!("Limit reached, skipping remaining sources");
            break;
        }
        if cancel.is_cancelled() {
            break;
        }
        info!("Filtering {}", path.display());

        // Stopped early once the limit is reached so no work outlives the source
        let stop = cancel.child();
        let (records, errors) = match &strategy {
            Strategy::Sequential(filter) => {
                let (lines, errors) = reader.read_lines(&stop, path);
                (filter.filter(&stop, lines, tree.clone()), errors)
            }
            Strategy::Parallel(filter) if config.chunk_size > 0 => {
                let (chunks, errors) = reader.read_chunks(&stop, path, config.chunk_size);
                (filter.filter_chunks(&stop, chunks, tree.clone(), 1), errors)
            }
            Strategy::Parallel(filter) => {
                let (lines, errors) = reader.read_lines(&stop, path);
                (filter.filter(&stop, lines, tree.clone()), errors)
            }
        };

        let sorted = config.ordered && matches!(strategy, Strategy::Parallel(_));
        let drained = drain(records, writer, &pool, sorted, &stop);
        let limited = stop.is_cancelled();
        stop.cancel();
        drained?;

        if cancel.is_cancelled() {
            debug!("Cancelled while filtering {}", path.display());
            break;
        }

        // A reader stopped by the limit may still be blocked on input
        let error = if limited {
            errors.try_recv().ok()
        } else {
            errors.recv().ok()
        };
        match error {
            Some(SiftError::Cancelled) | None => {}
            Some(e) => {
                let name = source_name(path);
                warn!("Skipping {}: {}", name, e);
                sources_failed += 1;
            }
        }
    }

    metrics.log_stats();
    Ok(SiftSummary {
        stats: metrics.get_stats(),
        duration: start.elapsed(),
        sources_failed,
        cancelled: cancel.is_cancelled(),
    })
}

/// Writes every record until the writer is full, returning each to the pool.
///
/// Reaching the limit cancels `stop` and waits for the pipeline to wind down,
/// so the counters are final when this returns.
fn drain<W: Write>(
    records: Receiver<Record>,
    writer: &mut Writer<W>,
    pool: &RecordPool,
    sorted: bool,
    stop: &Cancellation,
) -> SiftResult<()> {
    if sorted {
        let mut buffered: Vec<Record> = records.iter().collect();
        buffered.sort_by_key(|r| r.sequence);
        let mut result = Ok(());
        for record in buffered {
            if result.is_ok() && !writer.is_full() {
                result = writer.write(&record).map(|_| ());
            }
            pool.release(record);
        }
        return Ok(result?);
    }

    let mut result = Ok(true);
    for record in records.iter() {
        if result.is_ok() && !writer.is_full() {
            result = writer.write(&record);
            if !matches!(result, Ok(true)) {
                stop.cancel();
            }
        }
        pool.release(record);
    }
    result?;
    Ok(())
}

fn source_name(path: &Path) -> String {
    if path.as_os_str() == STDIN_PATH {
        "<stdin>".to_string()
    } else {
        path.display().to_string()
    }
}
