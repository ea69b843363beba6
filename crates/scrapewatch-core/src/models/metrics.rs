//! Metrics data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health metrics computed from one pipeline run's record set.
///
/// Snapshots are derived fresh on every run and never persisted here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Runs in the analysis window
    pub total_runs: u64,

    /// Successful runs in the analysis window
    pub successful_runs: u64,

    /// Failed runs in the analysis window
    pub failed_runs: u64,

    /// Successful runs as a percentage of all runs (0-100)
    pub success_rate: f64,

    /// Distinct job owners seen
    pub unique_owners: u64,

    /// Records produced by successful runs
    pub total_records: u64,

    /// Records per successful run
    pub avg_records_per_run: f64,

    /// Runs inside the alerting sub-window
    pub recent_runs: u64,

    /// Success rate inside the alerting sub-window (0-100)
    pub recent_success_rate: f64,
}

/// Unit tag attached to a published data point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricUnit {
    /// Plain count
    Count,
    /// Percentage in the 0-100 range
    Percent,
}

impl MetricUnit {
    /// Unit label sent to sinks
    pub fn as_str(self) -> &'static str {
        match self {
            MetricUnit::Count => "Count",
            MetricUnit::Percent => "Percent",
        }
    }
}

/// A single named, timestamped data point sent to the monitoring sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDatum {
    /// Metric name
    pub name: String,
    /// Metric value
    pub value: f64,
    /// Unit tag
    pub unit: MetricUnit,
    /// Capture time (publish time, not record time)
    pub timestamp: DateTime<Utc>,
}

impl MetricsSnapshot {
    /// Flatten the snapshot into one data point per field, all stamped with `at`
    #[allow(clippy::cast_precision_loss)]
    pub fn to_data_points(&self, at: DateTime<Utc>) -> Vec<MetricDatum> {
        let fields: [(&str, f64, MetricUnit); 9] = [
            ("TotalRuns", self.total_runs as f64, MetricUnit::Count),
            ("SuccessfulRuns", self.successful_runs as f64, MetricUnit::Count),
            ("FailedRuns", self.failed_runs as f64, MetricUnit::Count),
            ("SuccessRate", self.success_rate, MetricUnit::Percent),
            ("UniqueOwners", self.unique_owners as f64, MetricUnit::Count),
            ("TotalRecords", self.total_records as f64, MetricUnit::Count),
            ("AvgRecordsPerRun", self.avg_records_per_run, MetricUnit::Count),
            ("RecentRuns", self.recent_runs as f64, MetricUnit::Count),
            ("RecentSuccessRate", self.recent_success_rate, MetricUnit::Percent),
        ];

        fields
            .into_iter()
            .map(|(name, value, unit)| MetricDatum {
                name: name.to_string(),
                value,
                unit,
                timestamp: at,
            })
            .collect()
    }
}
