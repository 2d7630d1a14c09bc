//! Matching records against a filter tree, one line at a time or across a
//! pool of workers.

pub mod cache;
pub mod cancel;
pub mod matcher;
pub mod pipeline;

pub use cache::RegexCache;
pub use cancel::Cancellation;
pub use matcher::Matcher;
pub use pipeline::{FilterOptions, LineFilter, ParallelFilter, SequentialFilter};
