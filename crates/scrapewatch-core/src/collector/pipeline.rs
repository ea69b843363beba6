//! Pipeline orchestration
//!
//! One invocation reads the analysis window, aggregates it, publishes the
//! snapshot, evaluates alert rules and notifies the operator channel. Each step
//! waits for the previous one. A fatal error stops the run, triggers one
//! best-effort error notification and is then returned unchanged.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::alerting::{AlertEvaluator, AlertNotifier, NotificationSender};
use crate::config::{Config, WindowConfig};
use crate::db::{PostgresPool, PostgresRecordStore};
use crate::error::{Error, Result};
use crate::models::{AlertLine, MetricsSnapshot};
use crate::sink::{self, MetricsPublisher};
use crate::telemetry;

use super::aggregator::MetricsAggregator;
use super::reader::RecordReader;

/// Stages of a single pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Not started
    Idle,
    /// Fetching records
    Reading,
    /// Computing the snapshot
    Aggregating,
    /// Sending the snapshot to the sink
    Publishing,
    /// Applying alert rules
    Evaluating,
    /// Sending the alert message
    Notifying,
    /// Finished successfully
    Done,
    /// Aborted by a fatal error
    Failed,
}

impl PipelineState {
    /// Whether the run has ended
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Whether `next` may follow this state
    pub fn can_advance_to(self, next: PipelineState) -> bool {
        use PipelineState::*;

        match (self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => self != Idle,
            (Idle, Reading)
            | (Reading, Aggregating)
            | (Aggregating, Publishing)
            | (Aggregating, Evaluating)
            | (Publishing, Evaluating)
            | (Evaluating, Notifying)
            | (Evaluating, Done)
            | (Notifying, Done) => true,
            _ => false,
        }
    }

    /// What the pipeline is doing in this state, for messages
    pub fn activity(self) -> &'static str {
        match self {
            PipelineState::Idle => "starting",
            PipelineState::Reading => "reading job records",
            PipelineState::Aggregating => "aggregating metrics",
            PipelineState::Publishing => "publishing metrics",
            PipelineState::Evaluating => "evaluating alert rules",
            PipelineState::Notifying => "sending alerts",
            PipelineState::Done => "finishing",
            PipelineState::Failed => "failing",
        }
    }
}

/// State machine for one invocation; created fresh for every run
#[derive(Debug)]
pub struct PipelineRun {
    run_id: Uuid,
    state: PipelineState,
    transitions: Vec<PipelineState>,
    failed_in: Option<PipelineState>,
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRun {
    /// Start in `Idle`
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: PipelineState::Idle,
            transitions: vec![PipelineState::Idle],
            failed_in: None,
        }
    }

    /// Run identifier
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Current state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state entered, in order
    pub fn transitions(&self) -> &[PipelineState] {
        &self.transitions
    }

    /// The state that was active when the run failed
    pub fn failed_in(&self) -> Option<PipelineState> {
        self.failed_in
    }

    /// Move to `next`
    pub fn advance(&mut self, next: PipelineState) -> Result<()> {
        if next == PipelineState::Failed || !self.state.can_advance_to(next) {
            return Err(Error::internal(format!(
                "illegal pipeline transition {:?} -> {:?}",
                self.state, next
            )));
        }
        debug!(from = ?self.state, to = ?next, "Pipeline transition");
        self.state = next;
        self.transitions.push(next);
        Ok(())
    }

    /// Enter `Failed`, remembering where. No-op once terminal.
    pub fn fail(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        debug!(from = ?self.state, "Pipeline failed");
        self.failed_in = Some(self.state);
        self.state = PipelineState::Failed;
        self.transitions.push(PipelineState::Failed);
    }
}

/// What happened to the alert notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum NotifyOutcome {
    /// No alerts, no destination, or a dry run
    Skipped,
    /// Delivered
    Sent,
    /// Delivery failed; the run still succeeded
    Failed(String),
}

/// Result of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Run identifier
    pub run_id: Uuid,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Records read from the store
    pub records_fetched: usize,
    /// Computed snapshot
    pub snapshot: MetricsSnapshot,
    /// Fired alert lines
    pub alerts: Vec<AlertLine>,
    /// Alert notification result
    pub notification: NotifyOutcome,
    /// Whether the snapshot was published
    pub published: bool,
    /// States the run passed through
    pub transitions: Vec<PipelineState>,
    /// Wall time
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

/// The aggregation and alerting pipeline
pub struct Pipeline {
    reader: RecordReader,
    aggregator: MetricsAggregator,
    publisher: MetricsPublisher,
    evaluator: AlertEvaluator,
    notifier: Option<AlertNotifier>,
    windows: WindowConfig,
    deadline: Option<Duration>,
}

impl Pipeline {
    /// Assemble a pipeline from its components
    pub fn new(
        reader: RecordReader,
        publisher: MetricsPublisher,
        notifier: Option<AlertNotifier>,
        windows: WindowConfig,
    ) -> Self {
        Self {
            reader,
            aggregator: MetricsAggregator::new(windows.alert_window()),
            publisher,
            evaluator: AlertEvaluator::new(windows),
            notifier,
            windows,
            deadline: None,
        }
    }

    /// Build the production pipeline: PostgreSQL store, configured sink and channel
    pub fn from_config(config: &Config) -> Result<Self> {
        let pool = PostgresPool::connect_lazy(&config.store)?;
        let store = Arc::new(PostgresRecordStore::new(&pool, config.store.page_size));
        let reader = RecordReader::new(store, config.store.table.clone(), config.store.max_pages);

        let publisher = MetricsPublisher::new(sink::from_config(&config.sink)?, &config.sink.namespace);

        let notifier = match &config.notifications.channel {
            Some(destination) => Some(AlertNotifier::new(
                Arc::new(NotificationSender::new()?),
                destination.clone(),
                config.windows,
            )),
            None => {
                info!("No notification channel configured; alerts will only be logged");
                None
            }
        };

        Ok(Self::new(reader, publisher, notifier, config.windows).with_deadline(config.schedule.run_timeout))
    }

    /// Fail runs that take longer than `deadline`
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Execute one full run
    pub async fn run(&self) -> Result<RunOutcome> {
        self.execute(true).await
    }

    /// Read, aggregate and evaluate without publishing or notifying
    pub async fn check(&self) -> Result<RunOutcome> {
        self.execute(false).await
    }

    async fn execute(&self, live: bool) -> Result<RunOutcome> {
        let mut run = PipelineRun::new();
        let span = info_span!("pipeline_run", run_id = %run.run_id(), live);

        async {
            let started = Instant::now();
            let started_at = Utc::now();

            let result = match self.deadline {
                Some(deadline) => {
                    match tokio::time::timeout(deadline, self.stages(&mut run, live)).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::Timeout(format!(
                            "run exceeded {}",
                            humantime::format_duration(deadline)
                        ))),
                    }
                }
                None => self.stages(&mut run, live).await,
            };

            let elapsed = started.elapsed();
            histogram!(telemetry::RUN_DURATION_SECONDS).record(elapsed.as_secs_f64());

            match result {
                Ok(staged) => {
                    counter!(telemetry::RUNS_TOTAL, "outcome" => "success").increment(1);
                    info!(
                        records = staged.records_fetched,
                        alerts = staged.alerts.len(),
                        duration_ms = elapsed.as_millis() as u64,
                        "Pipeline run complete"
                    );
                    Ok(RunOutcome {
                        run_id: run.run_id(),
                        started_at,
                        records_fetched: staged.records_fetched,
                        snapshot: staged.snapshot,
                        alerts: staged.alerts,
                        notification: staged.notification,
                        published: live,
                        transitions: run.transitions().to_vec(),
                        duration: elapsed,
                    })
                }
                Err(err) => {
                    let stage = run.state();
                    run.fail();
                    counter!(telemetry::RUNS_TOTAL, "outcome" => "failed").increment(1);
                    error!(stage = stage.activity(), error = %err, "Pipeline run failed");

                    if live {
                        self.report_failure(stage, &err).await;
                    }
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn stages(&self, run: &mut PipelineRun, live: bool) -> Result<Staged> {
        run.advance(PipelineState::Reading)?;
        let records = self.reader.fetch_recent(self.windows.analysis_hours).await?;
        gauge!(telemetry::RECORDS_FETCHED).set(records.len() as f64);

        run.advance(PipelineState::Aggregating)?;
        let snapshot = self.aggregator.aggregate(&records);
        debug!(?snapshot, "Aggregated snapshot");

        if live {
            run.advance(PipelineState::Publishing)?;
            self.publisher.publish(&snapshot).await?;
        }

        run.advance(PipelineState::Evaluating)?;
        let report = self.evaluator.report(snapshot);
        for line in &report.lines {
            warn!(alert = %line, "Alert rule fired");
        }
        counter!(telemetry::ALERTS_FIRED_TOTAL).increment(report.lines.len() as u64);

        let notification = match &self.notifier {
            Some(notifier) if live && report.has_alerts() => {
                run.advance(PipelineState::Notifying)?;
                match notifier.notify(&report).await {
                    Ok(()) => {
                        info!(destination = %notifier.destination(), "Alert notification sent");
                        NotifyOutcome::Sent
                    }
                    Err(e) => {
                        counter!(telemetry::NOTIFY_FAILURES_TOTAL).increment(1);
                        warn!(error = %e, "Alert notification failed");
                        NotifyOutcome::Failed(e.to_string())
                    }
                }
            }
            _ => NotifyOutcome::Skipped,
        };

        run.advance(PipelineState::Done)?;

        Ok(Staged {
            records_fetched: records.len(),
            snapshot: report.snapshot,
            alerts: report.lines,
            notification,
        })
    }

    /// Best-effort error notification; its own failure is only logged
    async fn report_failure(&self, stage: PipelineState, err: &Error) {
        let Some(notifier) = &self.notifier else {
            return;
        };

        match notifier.notify_error(stage.activity(), err).await {
            Ok(()) => info!(destination = %notifier.destination(), "Error notification sent"),
            Err(e) => {
                counter!(telemetry::NOTIFY_FAILURES_TOTAL).increment(1);
                warn!(error = %e, "Error notification failed");
            }
        }
    }
}

struct Staged {
    records_fetched: usize,
    snapshot: MetricsSnapshot,
    alerts: Vec<AlertLine>,
    notification: NotifyOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::{OperatorChannel, ALERT_SUBJECT, ERROR_SUBJECT};
    use crate::config::NotificationChannel;
    use crate::db::{RecordPage, RecordStore};
    use crate::models::{JobRecord, JobStatus, MetricDatum, Notification};
    use crate::sink::MetricsSink;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    fn run_record(owner: &str, status: JobStatus, count: u64, hours_ago: i64) -> JobRecord {
        let ts = Utc::now() - ChronoDuration::hours(hours_ago);
        JobRecord {
            owner_id: owner.to_string(),
            run_date: ts.date_naive(),
            record_count: count,
            summary: String::new(),
            status,
            payload: None,
            error: None,
            timestamp: Some(ts),
        }
    }

    /// Splits records into pages of `page_size`; `fail_on` errors that page (1-based)
    struct MemoryStore {
        records: Vec<JobRecord>,
        page_size: usize,
        fail_on: Option<usize>,
        calls: Mutex<usize>,
    }

    impl MemoryStore {
        fn new(records: Vec<JobRecord>) -> Self {
            Self {
                records,
                page_size: 3,
                fail_on: None,
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl RecordStore for MemoryStore {
        async fn query_page(
            &self,
            _table: &str,
            _since: &str,
            cursor: Option<&str>,
        ) -> Result<RecordPage> {
            let page = {
                let mut calls = self.calls.lock();
                *calls += 1;
                *calls
            };
            if self.fail_on == Some(page) {
                return Err(Error::store("throttled"));
            }

            let start: usize = cursor.map_or(0, |c| c.parse().unwrap());
            let end = (start + self.page_size).min(self.records.len());
            Ok(RecordPage {
                items: self.records[start..end].to_vec(),
                next_cursor: (end < self.records.len()).then(|| end.to_string()),
            })
        }
    }

    #[derive(Default)]
    struct FakeSink {
        batches: Mutex<Vec<Vec<MetricDatum>>>,
        reject: bool,
    }

    #[async_trait]
    impl MetricsSink for FakeSink {
        async fn put_metric_data(&self, _namespace: &str, data: &[MetricDatum]) -> Result<()> {
            if self.reject {
                return Err(Error::publish("sink unreachable"));
            }
            self.batches.lock().push(data.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeChannel {
        sent: Mutex<Vec<Notification>>,
        fail: bool,
    }

    #[async_trait]
    impl OperatorChannel for FakeChannel {
        async fn send(
            &self,
            _destination: &NotificationChannel,
            notification: &Notification,
        ) -> Result<()> {
            self.sent.lock().push(notification.clone());
            if self.fail {
                return Err(Error::notify("channel down"));
            }
            Ok(())
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        sink: Arc<FakeSink>,
        channel: Arc<FakeChannel>,
        pipeline: Pipeline,
    }

    fn harness(store: MemoryStore, sink: FakeSink, channel: Option<FakeChannel>) -> Harness {
        let store = Arc::new(store);
        let sink = Arc::new(sink);
        let channel = Arc::new(channel.unwrap_or_default());
        let windows = WindowConfig::default();

        let notifier = Some(AlertNotifier::new(
            channel.clone(),
            NotificationChannel::PagerDuty {
                routing_key: "test".to_string(),
            },
            windows,
        ));

        let pipeline = Pipeline::new(
            RecordReader::new(store.clone(), "job_records", 50),
            MetricsPublisher::new(sink.clone(), "Test"),
            notifier,
            windows,
        );

        Harness {
            store,
            sink,
            channel,
            pipeline,
        }
    }

    #[tokio::test]
    async fn test_healthy_run_publishes_and_skips_notifier() {
        let mut records: Vec<_> = (0..7)
            .map(|i| run_record(&format!("o{i}"), JobStatus::Success, 5, 1))
            .collect();
        records.extend((0..3).map(|_| run_record("o0", JobStatus::Failure, 0, 2)));
        let h = harness(MemoryStore::new(records), FakeSink::default(), None);

        let outcome = h.pipeline.run().await.unwrap();

        assert_eq!(outcome.records_fetched, 10);
        assert_eq!(outcome.snapshot.success_rate, 70.0);
        assert_eq!(outcome.snapshot.total_records, 35);
        assert_eq!(outcome.snapshot.avg_records_per_run, 5.0);
        assert_eq!(outcome.snapshot.recent_runs, 10);
        assert_eq!(outcome.snapshot.recent_success_rate, 70.0);
        assert!(outcome.alerts.is_empty());
        assert_eq!(outcome.notification, NotifyOutcome::Skipped);
        assert_eq!(h.sink.batches.lock().len(), 1);
        assert!(h.channel.sent.lock().is_empty());
        assert_eq!(
            outcome.transitions,
            [
                PipelineState::Idle,
                PipelineState::Reading,
                PipelineState::Aggregating,
                PipelineState::Publishing,
                PipelineState::Evaluating,
                PipelineState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_stale_records_fire_single_alert() {
        let mut records: Vec<_> = (0..2)
            .map(|_| run_record("a", JobStatus::Success, 4, 30))
            .collect();
        records.extend((0..3).map(|_| run_record("b", JobStatus::Failure, 0, 48)));
        let h = harness(MemoryStore::new(records), FakeSink::default(), None);

        let outcome = h.pipeline.run().await.unwrap();

        assert_eq!(outcome.snapshot.recent_runs, 0);
        assert_eq!(outcome.snapshot.success_rate, 40.0);
        assert_eq!(
            outcome.alerts,
            [AlertLine::new("no runs detected in the last 24 hours")]
        );
        assert_eq!(outcome.notification, NotifyOutcome::Sent);

        let sent = h.channel.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, ALERT_SUBJECT);
    }

    #[tokio::test]
    async fn test_recent_failures_fire_two_alerts_in_one_notification() {
        let mut records: Vec<_> = (0..4)
            .map(|_| run_record("a", JobStatus::Failure, 0, 3))
            .collect();
        records.extend((0..6).map(|_| run_record("b", JobStatus::Failure, 0, 72)));
        records.push(run_record("c", JobStatus::Success, 9, 100));
        let h = harness(MemoryStore::new(records), FakeSink::default(), None);

        let outcome = h.pipeline.run().await.unwrap();

        assert_eq!(outcome.snapshot.recent_success_rate, 0.0);
        assert_eq!(outcome.alerts.len(), 2);
        assert_eq!(outcome.notification, NotifyOutcome::Sent);

        let sent = h.channel.sent.lock();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("Low success rate in the last 24 hours: 0.0%"));
        assert!(sent[0].body.contains("Low overall success rate over the last 7 days: 9.1%"));
    }

    #[tokio::test]
    async fn test_store_failure_stops_pipeline_and_reports_error() {
        let records: Vec<_> = (0..9)
            .map(|_| run_record("a", JobStatus::Success, 1, 1))
            .collect();
        let store = MemoryStore {
            fail_on: Some(2),
            ..MemoryStore::new(records)
        };
        let h = harness(store, FakeSink::default(), None);

        let err = h.pipeline.run().await.unwrap_err();

        assert!(matches!(err, Error::StoreUnavailable(ref m) if m.contains("throttled")));
        assert_eq!(*h.store.calls.lock(), 2);
        assert!(h.sink.batches.lock().is_empty());

        let sent = h.channel.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, ERROR_SUBJECT);
        assert!(sent[0].body.contains("reading job records"));
    }

    #[tokio::test]
    async fn test_publish_failure_is_fatal() {
        let records = vec![run_record("a", JobStatus::Failure, 0, 1)];
        let sink = FakeSink {
            reject: true,
            ..Default::default()
        };
        let h = harness(MemoryStore::new(records), sink, None);

        let err = h.pipeline.run().await.unwrap_err();

        assert!(matches!(err, Error::PublishFailed(_)));
        let sent = h.channel.sent.lock();
        assert_eq!(sent.len(), 1, "only the error notification is sent");
        assert_eq!(sent[0].subject, ERROR_SUBJECT);
        assert!(sent[0].body.contains("publishing metrics"));
    }

    #[tokio::test]
    async fn test_error_notification_failure_keeps_original_error() {
        let store = MemoryStore {
            fail_on: Some(1),
            ..MemoryStore::new(vec![])
        };
        let channel = FakeChannel {
            fail: true,
            ..Default::default()
        };
        let h = harness(store, FakeSink::default(), Some(channel));

        let err = h.pipeline.run().await.unwrap_err();

        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert_eq!(h.channel.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_alert_delivery_failure_does_not_fail_run() {
        let records = vec![run_record("a", JobStatus::Failure, 0, 1)];
        let channel = FakeChannel {
            fail: true,
            ..Default::default()
        };
        let h = harness(MemoryStore::new(records), FakeSink::default(), Some(channel));

        let outcome = h.pipeline.run().await.unwrap();

        assert_eq!(outcome.alerts.len(), 2);
        assert!(matches!(outcome.notification, NotifyOutcome::Failed(ref m) if m.contains("channel down")));
        assert_eq!(h.sink.batches.lock().len(), 1);
        assert_eq!(outcome.transitions.last(), Some(&PipelineState::Done));
    }

    #[tokio::test]
    async fn test_without_destination_nothing_is_sent() {
        let store = Arc::new(MemoryStore {
            fail_on: Some(1),
            ..MemoryStore::new(vec![])
        });
        let sink = Arc::new(FakeSink::default());
        let pipeline = Pipeline::new(
            RecordReader::new(store, "job_records", 50),
            MetricsPublisher::new(sink, "Test"),
            None,
            WindowConfig::default(),
        );

        assert!(matches!(
            pipeline.run().await,
            Err(Error::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_check_neither_publishes_nor_notifies() {
        let records = vec![run_record("a", JobStatus::Failure, 0, 1)];
        let h = harness(MemoryStore::new(records), FakeSink::default(), None);

        let outcome = h.pipeline.check().await.unwrap();

        assert!(!outcome.published);
        assert_eq!(outcome.alerts.len(), 2);
        assert_eq!(outcome.notification, NotifyOutcome::Skipped);
        assert!(h.sink.batches.lock().is_empty());
        assert!(h.channel.sent.lock().is_empty());
        assert!(!outcome.transitions.contains(&PipelineState::Publishing));
    }

    #[test]
    fn test_state_machine_rejects_illegal_transitions() {
        let mut run = PipelineRun::new();
        assert!(run.advance(PipelineState::Publishing).is_err());
        assert!(run.advance(PipelineState::Failed).is_err());

        run.advance(PipelineState::Reading).unwrap();
        run.fail();
        assert_eq!(run.state(), PipelineState::Failed);
        assert_eq!(run.failed_in(), Some(PipelineState::Reading));
        assert!(run.advance(PipelineState::Aggregating).is_err());

        run.fail();
        assert_eq!(
            run.transitions(),
            [PipelineState::Idle, PipelineState::Reading, PipelineState::Failed]
        );
    }

    #[tokio::test]
    async fn test_slow_run_times_out_as_failure() {
        struct SlowStore;

        #[async_trait]
        impl RecordStore for SlowStore {
            async fn query_page(&self, _: &str, _: &str, _: Option<&str>) -> Result<RecordPage> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(RecordPage::default())
            }
        }

        let channel = Arc::new(FakeChannel::default());
        let pipeline = Pipeline::new(
            RecordReader::new(Arc::new(SlowStore), "job_records", 5),
            MetricsPublisher::new(Arc::new(FakeSink::default()), "Test"),
            Some(AlertNotifier::new(
                channel.clone(),
                NotificationChannel::PagerDuty {
                    routing_key: "k".to_string(),
                },
                WindowConfig::default(),
            )),
            WindowConfig::default(),
        )
        .with_deadline(Duration::from_millis(50));

        let err = pipeline.run().await.unwrap_err();

        assert!(matches!(err, Error::Timeout(_)));
        let sent = channel.sent.lock();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("reading job records"));
    }
}
