//! Aggregation of job records into a health snapshot

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use crate::models::{JobRecord, MetricsSnapshot};

/// Computes [`MetricsSnapshot`]s. Pure: no I/O, and the result does not depend
/// on record order.
#[derive(Debug, Clone, Copy)]
pub struct MetricsAggregator {
    alert_window: Duration,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

impl MetricsAggregator {
    /// Create an aggregator whose recent sub-window spans `alert_window`
    pub fn new(alert_window: Duration) -> Self {
        Self { alert_window }
    }

    /// Aggregate relative to the current time
    pub fn aggregate(&self, records: &[JobRecord]) -> MetricsSnapshot {
        self.aggregate_at(records, Utc::now())
    }

    /// Aggregate relative to `now`
    pub fn aggregate_at(&self, records: &[JobRecord], now: DateTime<Utc>) -> MetricsSnapshot {
        let recent_cutoff = now - self.alert_window;

        let mut successful = 0u64;
        let mut total_records = 0u64;
        let mut recent = 0u64;
        let mut recent_successful = 0u64;
        let mut owners = HashSet::new();

        for record in records {
            owners.insert(record.owner_id.as_str());
            total_records = total_records.saturating_add(record.counted_records());

            if record.is_success() {
                successful += 1;
            }

            if record.effective_timestamp() >= recent_cutoff {
                recent += 1;
                if record.is_success() {
                    recent_successful += 1;
                }
            }
        }

        let total = records.len() as u64;

        MetricsSnapshot {
            total_runs: total,
            successful_runs: successful,
            failed_runs: total - successful,
            success_rate: percentage(successful, total),
            unique_owners: owners.len() as u64,
            total_records,
            avg_records_per_run: ratio(total_records, successful),
            recent_runs: recent,
            recent_success_rate: percentage(recent_successful, recent),
        }
    }
}

/// `part / whole * 100`, or 0 for an empty whole
#[allow(clippy::cast_precision_loss)]
fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
