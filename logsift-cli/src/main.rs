use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use logsift::{
    sift, Cancellation, ConfigOverrides, Formatter, LogFormat, OutputFormat, SiftConfig,
    SiftError, SiftSummary, Writer,
};
use std::io::{self, BufWriter, ErrorKind};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Filter JSON and key=value logs with a query", long_about = None)]
struct Cli {
    /// Filter expression, e.g. 'level:error,status>=500' (required unless set in config)
    #[arg(short = 'f', long = "filter")]
    query: Option<String>,

    /// Files to read; '-' reads standard input (the default)
    files: Vec<PathBuf>,

    /// Output format (raw, json, fields, pretty) [default: raw]
    #[arg(short = 'o', long = "output")]
    output: Option<OutputFormat>,

    /// Comma-separated fields to print
    #[arg(short = 'F', long = "fields", value_delimiter = ',')]
    fields: Vec<String>,

    /// Print the number of matching records only
    #[arg(short = 'c', long = "count")]
    count: bool,

    /// Stop after N matches (0 = no limit)
    #[arg(short = 'n', long = "limit")]
    limit: Option<u64>,

    /// Case-insensitive matching
    #[arg(short = 'i', long = "ignore-case")]
    ignore_case: bool,

    /// Print records that do not match
    #[arg(short = 'v', long = "invert")]
    invert: bool,

    /// Number of worker threads [default: CPU cores]
    #[arg(short = 'j', long = "jobs")]
    jobs: Option<NonZeroUsize>,

    /// Lines per batch handed to a worker (0 = one line at a time) [default: 0]
    #[arg(long = "chunk-size")]
    chunk_size: Option<usize>,

    /// Input format (auto, json, keyvalue) [default: auto]
    #[arg(long = "format")]
    format: Option<LogFormat>,

    /// Print matches of each file in line order
    #[arg(long)]
    ordered: bool,

    /// Print statistics to stderr after the run
    #[arg(long)]
    stats: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Additional YAML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error) [default: warn]
    #[arg(long)]
    log_level: Option<String>,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn into_overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            query: self.query,
            files: self.files,
            format: self.format,
            output: self.output,
            fields: self.fields,
            ignore_case: self.ignore_case,
            invert: self.invert,
            jobs: self.jobs,
            chunk_size: self.chunk_size,
            ordered: self.ordered,
            limit: self.limit,
            count_only: self.count,
            stats: self.stats,
            no_color: self.no_color,
            log_level: self.log_level,
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let print_config = cli.print_config;

    let file_config = SiftConfig::load_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    let config = file_config.merge_with_cli(cli.into_overrides());

    init_tracing(&config.log_level);
    debug!("Effective configuration: {:?}", config);

    if print_config {
        print!("{}", config.to_yaml()?);
        return Ok(ExitCode::SUCCESS);
    }

    if config.query.trim().is_empty() {
        bail!("No filter given; pass one with -f/--filter or set 'query' in the config file");
    }
    if !config.color {
        colored::control::set_override(false);
    }

    let formatter = Formatter::new(config.output)
        .with_fields(config.fields.clone())
        .with_color(config.color);
    let stdout = io::stdout();
    let mut writer = Writer::new(BufWriter::new(stdout.lock()), formatter)
        .with_limit(config.limit)
        .count_only(config.count_only);

    // Ctrl+C and SIGTERM stop the run; what was matched so far is still reported
    let cancel = Cancellation::new();
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || on_signal.cancel())
        .context("Failed to install the interrupt handler")?;

    let summary = match sift(&config, &cancel, &mut writer) {
        Ok(summary) => summary,
        Err(SiftError::IoError(e)) if e.kind() == ErrorKind::BrokenPipe => {
            return Ok(ExitCode::SUCCESS);
        }
        Err(e) => return Err(e).context("Filtering failed"),
    };

    match writer.finish() {
        Err(e) if e.kind() == ErrorKind::BrokenPipe => return Ok(ExitCode::SUCCESS),
        other => other.context("Failed to write output")?,
    }

    if summary.cancelled {
        info!("Interrupted, reporting partial results");
    }
    if config.stats {
        print_stats(&summary);
    }

    if summary.sources_failed > 0 {
        Ok(ExitCode::from(2))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn print_stats(summary: &SiftSummary) {
    let stats = &summary.stats;
    // Whole milliseconds keep the duration readable
    let elapsed = std::time::Duration::from_millis(summary.duration.as_millis() as u64);

    eprintln!("\n{}", "Statistics".bold());
    eprintln!("  {:<14} {}", "Lines:", stats.total_lines);
    eprintln!(
        "  {:<14} {}",
        "Matched:",
        stats.matched_lines.to_string().green()
    );
    eprintln!(
        "  {:<14} {}",
        "Parse errors:",
        if stats.parse_errors > 0 {
            stats.parse_errors.to_string().red()
        } else {
            stats.parse_errors.to_string().normal()
        }
    );
    if summary.cancelled {
        eprintln!("  {:<14} {}", "Interrupted:", "yes".yellow());
    }
    if summary.sources_failed > 0 {
        eprintln!(
            "  {:<14} {}",
            "Failed files:",
            summary.sources_failed.to_string().red()
        );
    }
    eprintln!(
        "  {:<14} {} ({:.0} lines/s)",
        "Elapsed:",
        humantime::format_duration(elapsed),
        stats.rate(summary.duration)
    );
}
