//! Data models for ScrapeWatch

mod alert;
mod job;
mod metrics;

pub use alert::*;
pub use job::*;
pub use metrics::*;
