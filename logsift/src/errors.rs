/// Error types for logsift.
///
/// Three families of failure exist and they are handled very differently:
///
/// 1. [`QueryError`] - the filter expression could not be compiled. This is
///    fatal and happens before any line is read.
/// 2. [`ParseError`] - one input line is malformed. The line is skipped and
///    counted; processing continues.
/// 3. [`SiftError`] - crate-level failures, mostly I/O on a source. Such an
///    error ends the current source but not the run.
///
/// ```rust,ignore
/// match QueryParser::new().parse("level:error,status>=500") {
///     Ok(tree) => // hand the tree to the pipeline,
///     Err(QueryError::EmptyQuery) => // nothing to filter by,
///     Err(e) => // report position and abort
/// }
/// ```
use std::path::PathBuf;
use thiserror::Error;

/// Result type for logsift operations
pub type SiftResult<T> = Result<T, SiftError>;

/// Errors produced while compiling a query string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("empty query")]
    EmptyQuery,
    #[error("invalid query syntax at position {position}")]
    InvalidSyntax { position: usize },
    #[error("unclosed parenthesis opened at position {position}")]
    UnclosedGroup { position: usize },
    #[error("invalid operator at position {position}")]
    InvalidOperator { position: usize },
    #[error("missing field name at position {position}")]
    MissingField { position: usize },
}

/// A single line that could not be turned into a record
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("malformed JSON on line {sequence}: {source}")]
    Json {
        sequence: u64,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {sequence} is JSON but not an object")]
    NotAnObject { sequence: u64 },
}

impl ParseError {
    /// The sequence number of the offending line
    pub fn sequence(&self) -> u64 {
        match self {
            ParseError::Json { sequence, .. } | ParseError::NotAnObject { sequence } => *sequence,
        }
    }
}

/// Errors that can occur while filtering a source
#[derive(Error, Debug)]
pub enum SiftError {
    #[error("Query error: {0}")]
    Query(#[from] QueryError),
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Operation cancelled")]
    Cancelled,
}

impl SiftError {
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound(path.into())
    }

    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Maps an error from opening `path` onto the matching variant
    pub fn from_open(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::file_not_found(path),
            std::io::ErrorKind::PermissionDenied => Self::permission_denied(path),
            _ => Self::IoError(err),
        }
    }
}
