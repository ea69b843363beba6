//! Collector module - record reads, aggregation and run orchestration
//!
//! The reader pulls every job record inside the analysis window from the store,
//! the aggregator reduces them to a snapshot, and the pipeline drives one run
//! through publishing, alert evaluation and notification. The scheduler repeats
//! runs on a fixed interval for the long-running service.

mod aggregator;
mod pipeline;
mod reader;
mod scheduler;

pub use aggregator::MetricsAggregator;
pub use pipeline::{NotifyOutcome, Pipeline, PipelineRun, PipelineState, RunOutcome};
pub use reader::RecordReader;
pub use scheduler::{Scheduler, ServiceStatus, StatusBoard};
