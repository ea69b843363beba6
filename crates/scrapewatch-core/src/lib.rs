//! # ScrapeWatch
//!
//! Health metrics and alerting for scheduled scrape jobs.
//!
//! Each scrape run writes a job record. ScrapeWatch periodically reads the
//! records of a recent window, reduces them to a health snapshot, publishes the
//! snapshot to a monitoring sink and notifies an operator when fixed thresholds
//! are crossed.
//!
//! ## Architecture
//!
//! - **Collector**: paginated record reads, aggregation and run orchestration
//! - **Sink**: metric publishing to an HTTP ingest endpoint or Redis
//! - **Alerting**: threshold rules and Slack, webhook or PagerDuty delivery
//! - **API**: status server for the long-running scheduler
//!
//! ## Quick Start
//!
//! ```bash
//! # One run, e.g. from cron
//! scrapewatch run
//!
//! # Evaluate without publishing or notifying
//! scrapewatch check
//!
//! # Run on the configured interval with a status server
//! scrapewatch serve
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_precision_loss)]

pub mod alerting;
pub mod api;
pub mod collector;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod sink;
pub mod telemetry;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::collector::{Pipeline, RunOutcome, Scheduler};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
}
