// Progress tracking: line parser, state aggregator, file-size poller

pub mod aggregator;
pub mod parser;
pub mod poller;

pub use aggregator::{AggregatedProgress, Effect, ProgressAggregator, ProgressEvent, LOG_TAIL_CAPACITY};
pub use parser::{FileProgress, LineKind, ProgressParser, ProgressSnapshot, Stage};
pub use poller::FileSizePoller;
