//! Alert data models

use serde::{Deserialize, Serialize};
use std::fmt;

use super::MetricsSnapshot;

/// A single human-readable alert condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertLine(pub String);

impl AlertLine {
    /// Create an alert line
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Alert text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Alert lines together with the snapshot that produced them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertReport {
    /// Fired alerts, in rule order
    pub lines: Vec<AlertLine>,
    /// Snapshot the rules were evaluated against
    pub snapshot: MetricsSnapshot,
}

impl AlertReport {
    /// Whether any rule fired
    pub fn has_alerts(&self) -> bool {
        !self.lines.is_empty()
    }
}

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Degraded pipeline health
    #[default]
    Warning,
    /// The pipeline itself failed
    Critical,
}

impl Severity {
    /// Lowercase label
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// A composed message for the operator channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Subject line
    pub subject: String,
    /// Message body
    pub body: String,
    /// Severity
    pub severity: Severity,
}
