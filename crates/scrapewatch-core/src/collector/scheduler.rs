//! Periodic trigger and the shared status board

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::pipeline::{Pipeline, RunOutcome};

/// Service state exposed on `/status`
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceStatus {
    /// Completed invocations
    pub runs: u64,
    /// Invocations that failed
    pub failures: u64,
    /// Start of the most recent invocation
    pub last_run_at: Option<DateTime<Utc>>,
    /// Start of the most recent successful invocation
    pub last_success_at: Option<DateTime<Utc>>,
    /// Most recent successful outcome
    pub last_outcome: Option<RunOutcome>,
    /// Error of the most recent invocation, cleared on success
    pub last_error: Option<String>,
    /// When the next invocation is due
    pub next_run_at: Option<DateTime<Utc>>,
}

/// Shared, cheaply cloneable view of the scheduler's progress
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<ServiceStatus>>,
}

impl StatusBoard {
    /// Empty board
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current status
    pub fn snapshot(&self) -> ServiceStatus {
        self.inner.read().clone()
    }

    /// Record a successful run
    pub fn record_success(&self, outcome: RunOutcome) {
        let mut status = self.inner.write();
        status.runs += 1;
        status.last_run_at = Some(outcome.started_at);
        status.last_success_at = Some(outcome.started_at);
        status.last_error = None;
        status.last_outcome = Some(outcome);
    }

    /// Record a failed run
    pub fn record_failure(&self, started_at: DateTime<Utc>, error: String) {
        let mut status = self.inner.write();
        status.runs += 1;
        status.failures += 1;
        status.last_run_at = Some(started_at);
        status.last_error = Some(error);
    }

    fn set_next_run(&self, at: DateTime<Utc>) {
        self.inner.write().next_run_at = Some(at);
    }
}

/// Invokes the pipeline on a fixed interval. Runs never overlap; a slow run
/// delays the following tick instead of stacking invocations.
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    interval: Duration,
    status: StatusBoard,
}

impl Scheduler {
    /// Create a scheduler reporting into `status`
    pub fn new(pipeline: Arc<Pipeline>, interval: Duration, status: StatusBoard) -> Self {
        Self {
            pipeline,
            interval,
            status,
        }
    }

    /// Status board shared with the status server
    pub fn status(&self) -> StatusBoard {
        self.status.clone()
    }

    /// Run one invocation immediately and then every interval until `shutdown`
    /// resolves.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            interval = %humantime::format_duration(self.interval),
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                () = &mut shutdown => {
                    info!("Scheduler stopping");
                    break;
                }
            }
        }
    }

    /// One scheduled invocation
    pub async fn tick(&self) {
        let started_at = Utc::now();

        match self.pipeline.run().await {
            Ok(outcome) => self.status.record_success(outcome),
            Err(e) => {
                warn!(error = %e, "Scheduled run failed");
                self.status.record_failure(started_at, e.to_string());
            }
        }

        if let Ok(interval) = chrono::Duration::from_std(self.interval) {
            self.status.set_next_run(Utc::now() + interval);
        }
    }
}
