//! Job record data model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of a single scheduled job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// The run completed and produced records
    Success,
    /// The run failed
    Failure,
}

impl JobStatus {
    /// Wire representation used by the record store
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(JobStatus::Success),
            "failure" => Ok(JobStatus::Failure),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// One outcome of a single scheduled scrape job run.
///
/// Records are written once by the job runner and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Owner of the scheduled job
    pub owner_id: String,

    /// Calendar date the run belongs to
    pub run_date: NaiveDate,

    /// Number of records the run produced
    #[serde(default)]
    pub record_count: u64,

    /// Free-text summary written by the job
    #[serde(default)]
    pub summary: String,

    /// Run outcome
    pub status: JobStatus,

    /// Opaque job output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    /// Error text for failed runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Event time, authoritative for windowing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Whether the run succeeded
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }

    /// Records produced, counting only successful runs
    pub fn counted_records(&self) -> u64 {
        if self.is_success() {
            self.record_count
        } else {
            0
        }
    }

    /// Timestamp used for windowing: the event time, or midnight UTC of the run date
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        self.timestamp
            .unwrap_or_else(|| self.run_date.and_time(chrono::NaiveTime::MIN).and_utc())
    }
}
