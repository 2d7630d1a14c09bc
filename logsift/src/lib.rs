//! Filtering of structured log lines with a small query language.
//!
//! ```rust,ignore
//! use logsift::{sift, Cancellation, Formatter, OutputFormat, SiftConfig, Writer};
//!
//! let config = SiftConfig {
//!     query: "level:error,status>=500".to_string(),
//!     files: vec!["app.log".into()],
//!     ..SiftConfig::default()
//! };
//! let mut writer = Writer::new(std::io::stdout(), Formatter::new(OutputFormat::Raw));
//! let summary = sift(&config, &Cancellation::new(), &mut writer)?;
//! ```

pub mod config;
pub mod engine;
pub mod errors;
pub mod filter;
pub mod metrics;
pub mod output;
pub mod parser;
pub mod query;
pub mod record;
pub mod source;
pub mod value;

pub use config::{ConfigOverrides, SiftConfig};
pub use engine::{sift, SiftSummary};
pub use errors::{ParseError, QueryError, SiftError, SiftResult};
pub use filter::{Cancellation, LineFilter, Matcher, ParallelFilter, SequentialFilter};
pub use metrics::{FilterMetrics, FilterStats};
pub use output::{Formatter, OutputFormat, Writer};
pub use parser::{LineParser, LogFormat, RecordParser};
pub use query::{Condition, FilterNode, Logic, Operator, QueryParser};
pub use record::{Record, RecordPool};
pub use source::LineReader;
pub use value::Value;
