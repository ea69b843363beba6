//! Alert rule evaluation

use tracing::debug;

use crate::config::WindowConfig;
use crate::models::{AlertLine, AlertReport, MetricsSnapshot};

/// Recent success rate below this fires an alert
pub const RECENT_SUCCESS_THRESHOLD: f64 = 50.0;

/// Overall success rate below this fires an alert
pub const OVERALL_SUCCESS_THRESHOLD: f64 = 30.0;

/// Applies the fixed alert rules to a snapshot
#[derive(Debug, Clone, Copy)]
pub struct AlertEvaluator {
    windows: WindowConfig,
}

impl Default for AlertEvaluator {
    fn default() -> Self {
        Self::new(WindowConfig::default())
    }
}

impl AlertEvaluator {
    /// Create an evaluator; window lengths only affect the alert wording
    pub fn new(windows: WindowConfig) -> Self {
        Self { windows }
    }

    /// Evaluate all rules in order. Rules are independent; the first two are
    /// mutually exclusive because the second needs recent runs.
    pub fn evaluate(&self, snapshot: &MetricsSnapshot) -> Vec<AlertLine> {
        let recent = window_label(self.windows.alert_hours);
        let overall = window_label(self.windows.analysis_hours);
        let mut lines = Vec::new();

        if snapshot.recent_runs == 0 {
            lines.push(AlertLine::new(format!("no runs detected in the last {recent}")));
        } else if snapshot.recent_success_rate < RECENT_SUCCESS_THRESHOLD {
            lines.push(AlertLine::new(format!(
                "Low success rate in the last {recent}: {:.1}%",
                snapshot.recent_success_rate
            )));
        }

        if snapshot.total_runs > 0 && snapshot.success_rate < OVERALL_SUCCESS_THRESHOLD {
            lines.push(AlertLine::new(format!(
                "Low overall success rate over the last {overall}: {:.1}%",
                snapshot.success_rate
            )));
        }

        debug!(fired = lines.len(), "Evaluated alert rules");
        lines
    }

    /// Evaluate and bundle the result with its snapshot
    pub fn report(&self, snapshot: MetricsSnapshot) -> AlertReport {
        AlertReport {
            lines: self.evaluate(&snapshot),
            snapshot,
        }
    }
}

/// "24 hours", "7 days"
pub(crate) fn window_label(hours: u32) -> String {
    if hours >= 48 && hours % 24 == 0 {
        format!("{} days", hours / 24)
    } else if hours == 1 {
        "hour".to_string()
    } else {
        format!("{hours} hours")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn snapshot(total: u64, rate: f64, recent: u64, recent_rate: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            total_runs: total,
            success_rate: rate,
            recent_runs: recent,
            recent_success_rate: recent_rate,
            ..Default::default()
        }
    }

    fn texts(lines: Vec<AlertLine>) -> Vec<String> {
        lines.into_iter().map(|l| l.0).collect()
    }

    #[test]
    fn test_healthy_pipeline_fires_nothing() {
        let lines = AlertEvaluator::default().evaluate(&snapshot(10, 70.0, 10, 70.0));
        assert!(lines.is_empty());
    }

    #[test]
    fn test_no_recent_runs() {
        let lines = AlertEvaluator::default().evaluate(&snapshot(5, 40.0, 0, 0.0));
        assert_eq!(texts(lines), ["no runs detected in the last 24 hours"]);
    }

    #[test]
    fn test_recent_and_overall_failures_fire_together() {
        let lines = AlertEvaluator::default().evaluate(&snapshot(20, 20.0, 4, 0.0));
        assert_eq!(
            texts(lines),
            [
                "Low success rate in the last 24 hours: 0.0%",
                "Low overall success rate over the last 7 days: 20.0%",
            ]
        );
    }

    #[test]
    fn test_empty_snapshot_only_reports_missing_runs() {
        let lines = AlertEvaluator::default().evaluate(&MetricsSnapshot::default());
        assert_eq!(texts(lines), ["no runs detected in the last 24 hours"]);
    }

    #[rstest]
    #[case(49.9, true)]
    #[case(50.0, false)]
    #[case(0.0, true)]
    #[case(100.0, false)]
    fn test_recent_threshold(#[case] recent_rate: f64, #[case] fires: bool) {
        let lines = AlertEvaluator::default().evaluate(&snapshot(10, 90.0, 3, recent_rate));
        assert_eq!(lines.len(), usize::from(fires));
    }

    #[rstest]
    #[case(29.99, true)]
    #[case(30.0, false)]
    #[case(45.0, false)]
    fn test_overall_threshold(#[case] rate: f64, #[case] fires: bool) {
        let lines = AlertEvaluator::default().evaluate(&snapshot(10, rate, 3, 90.0));
        assert_eq!(lines.len(), usize::from(fires));
    }

    #[test]
    fn test_rates_are_rounded_to_one_decimal() {
        let lines = AlertEvaluator::default().evaluate(&snapshot(9, 66.0, 3, 33.333_333));
        assert_eq!(texts(lines), ["Low success rate in the last 24 hours: 33.3%"]);
    }

    #[test]
    fn test_wording_follows_configured_windows() {
        let evaluator = AlertEvaluator::new(WindowConfig {
            analysis_hours: 72,
            alert_hours: 6,
        });
        let lines = evaluator.evaluate(&snapshot(4, 25.0, 0, 0.0));
        assert_eq!(
            texts(lines),
            [
                "no runs detected in the last 6 hours",
                "Low overall success rate over the last 3 days: 25.0%",
            ]
        );
    }

    #[test]
    fn test_report_keeps_snapshot() {
        let s = snapshot(5, 40.0, 0, 0.0);
        let report = AlertEvaluator::default().report(s.clone());
        assert!(report.has_alerts());
        assert_eq!(report.snapshot, s);
    }
}
