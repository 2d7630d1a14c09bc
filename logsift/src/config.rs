use config::{Config as ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::errors::{SiftError, SiftResult};
use crate::filter::pipeline::default_workers;
use crate::output::OutputFormat;
use crate::parser::LogFormat;

/// Settings for one filtering run.
///
/// # Configuration Locations
///
/// Files are layered in this order, later ones overriding earlier ones:
/// 1. Global `$XDG_CONFIG_HOME/logsift/config.yaml`
/// 2. Local `.logsift.yaml` in the current directory
/// 3. A file given with `--config`
///
/// Command-line values then win over all of them, see [`SiftConfig::merge_with_cli`].
///
/// # Configuration Format
///
/// ```yaml
/// # Filter expression
/// query: "level:error,status>=500"
///
/// # Input dialect (auto, json, keyvalue)
/// format: auto
///
/// # Output (raw, json, fields, pretty) and the fields to print
/// output: fields
/// fields: ["timestamp", "message"]
///
/// # Worker count (default: CPU cores) and lines per batch (0 = no batching)
/// jobs: 4
/// chunk_size: 1000
///
/// ignore_case: true
/// ordered: true
/// limit: 100
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "info"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiftConfig {
    #[serde(default)]
    pub query: String,

    /// Sources to read; `-` is standard input
    #[serde(default)]
    pub files: Vec<PathBuf>,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: OutputFormat,

    /// Fields to print, in order; empty prints the whole record
    #[serde(default)]
    pub fields: Vec<String>,

    #[serde(default)]
    pub ignore_case: bool,

    #[serde(default)]
    pub invert: bool,

    #[serde(default = "default_jobs")]
    pub jobs: NonZeroUsize,

    /// Lines per batch for the parallel pipeline; 0 hands out single lines
    #[serde(default)]
    pub chunk_size: usize,

    /// Emit records of each source in line order
    #[serde(default)]
    pub ordered: bool,

    /// Stop after this many matches
    #[serde(default)]
    pub limit: Option<u64>,

    #[serde(default)]
    pub count_only: bool,

    #[serde(default)]
    pub stats: bool,

    #[serde(default = "default_color")]
    pub color: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_jobs() -> NonZeroUsize {
    default_workers()
}

fn default_color() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for SiftConfig {
    fn default() -> Self {
        Self {
            query: String::new(),
            files: Vec::new(),
            format: LogFormat::default(),
            output: OutputFormat::default(),
            fields: Vec::new(),
            ignore_case: false,
            invert: false,
            jobs: default_jobs(),
            chunk_size: 0,
            ordered: false,
            limit: None,
            count_only: false,
            stats: false,
            color: default_color(),
            log_level: default_log_level(),
        }
    }
}

impl SiftConfig {
    /// Loads configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads the default locations plus `config_path`, which must exist
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        let defaults = [
            dirs::config_dir().map(|p| p.join("logsift/config.yaml")),
            Some(PathBuf::from(".logsift.yaml")),
        ];
        for path in defaults.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder.build()?.try_deserialize()
    }

    /// Renders the configuration in the same YAML layout it is loaded from
    pub fn to_yaml(&self) -> SiftResult<String> {
        serde_yaml::to_string(self)
            .map_err(|e| SiftError::config_error(format!("Failed to serialize config: {}", e)))
    }

    /// Applies command-line values on top of the loaded configuration.
    ///
    /// Every value present in `cli` wins, even when it equals the default.
    pub fn merge_with_cli(mut self, cli: ConfigOverrides) -> Self {
        if let Some(query) = cli.query {
            self.query = query;
        }
        if !cli.files.is_empty() {
            self.files = cli.files;
        }
        if let Some(format) = cli.format {
            self.format = format;
        }
        if let Some(output) = cli.output {
            self.output = output;
        }
        if !cli.fields.is_empty() {
            self.fields = cli.fields;
        }
        // Flags can only switch behaviour on
        self.ignore_case |= cli.ignore_case;
        self.invert |= cli.invert;
        self.ordered |= cli.ordered;
        self.count_only |= cli.count_only;
        self.stats |= cli.stats;
        if cli.no_color {
            self.color = false;
        }
        if let Some(jobs) = cli.jobs {
            self.jobs = jobs;
        }
        if let Some(chunk_size) = cli.chunk_size {
            self.chunk_size = chunk_size;
        }
        if cli.limit.is_some() {
            self.limit = cli.limit;
        }
        if let Some(log_level) = cli.log_level {
            self.log_level = log_level;
        }
        self
    }
}

/// Values given on the command line; `None` and `false` leave the file value alone
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub query: Option<String>,
    pub files: Vec<PathBuf>,
    pub format: Option<LogFormat>,
    pub output: Option<OutputFormat>,
    pub fields: Vec<String>,
    pub ignore_case: bool,
    pub invert: bool,
    pub jobs: Option<NonZeroUsize>,
    pub chunk_size: Option<usize>,
    pub ordered: bool,
    pub limit: Option<u64>,
    pub count_only: bool,
    pub stats: bool,
    pub no_color: bool,
    pub log_level: Option<String>,
}
