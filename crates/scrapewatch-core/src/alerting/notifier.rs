//! Notification delivery to the operator channel

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::info;

use crate::config::{NotificationChannel, WindowConfig};
use crate::error::{Error, Result};
use crate::models::{AlertReport, Notification, Severity};

use super::evaluator::window_label;

/// Subject of the health alert message
pub const ALERT_SUBJECT: &str = "ScrapeWatch Alert: scrape pipeline health degraded";

/// Subject of the pipeline failure message
pub const ERROR_SUBJECT: &str = "ScrapeWatch Error: monitoring run failed";

const PAGERDUTY_EVENTS_URL: &str = "https://events.pagerduty.com/v2/enqueue";

/// Delivers a composed notification to a destination
#[async_trait]
pub trait OperatorChannel: Send + Sync {
    /// Send `notification` to `destination`
    async fn send(
        &self,
        destination: &NotificationChannel,
        notification: &Notification,
    ) -> Result<()>;
}

/// Sends notifications over HTTP to Slack, webhooks or PagerDuty
pub struct NotificationSender {
    client: &'static Client,
    pagerduty_url: String,
}

impl NotificationSender {
    /// Create a new notification sender
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: crate::http::shared_client()?,
            pagerduty_url: PAGERDUTY_EVENTS_URL.to_string(),
        })
    }

    /// Override the PagerDuty Events API endpoint
    pub fn with_pagerduty_url(mut self, url: impl Into<String>) -> Self {
        self.pagerduty_url = url.into();
        self
    }

    /// Send Slack notification
    async fn send_slack(
        &self,
        webhook_url: &str,
        channel: Option<&str>,
        notification: &Notification,
    ) -> Result<()> {
        let (color, emoji) = match notification.severity {
            Severity::Critical => ("#dc3545", "🚨"),
            Severity::Warning => ("#ffc107", "⚠️"),
        };

        let payload = SlackPayload {
            channel: channel.map(String::from),
            username: Some("ScrapeWatch".to_string()),
            icon_emoji: Some(":spider:".to_string()),
            attachments: vec![SlackAttachment {
                color: color.to_string(),
                title: format!("{} {}", emoji, notification.subject),
                text: notification.body.clone(),
                footer: Some("ScrapeWatch".to_string()),
                ts: Some(Utc::now().timestamp()),
            }],
        };

        let request = self.client.post(webhook_url).json(&payload);
        self.dispatch(request, "Slack").await?;

        info!(severity = notification.severity.as_str(), "Slack notification sent");
        Ok(())
    }

    /// Send generic webhook notification
    async fn send_webhook(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        notification: &Notification,
    ) -> Result<()> {
        let payload = WebhookPayload {
            subject: &notification.subject,
            body: &notification.body,
            severity: notification.severity.as_str(),
            sent_at: Utc::now(),
        };

        let mut request = self.client.post(url).json(&payload);
        for (key, value) in headers {
            request = request.header(key, value);
        }
        self.dispatch(request, "Webhook").await?;

        info!(url = %url, "Webhook notification sent");
        Ok(())
    }

    /// Send PagerDuty notification
    async fn send_pagerduty(&self, routing_key: &str, notification: &Notification) -> Result<()> {
        let severity = notification.severity.as_str();

        let payload = PagerDutyPayload {
            routing_key,
            event_action: "trigger",
            payload: PagerDutyEventPayload {
                summary: format!("[{}] {}", severity.to_uppercase(), notification.subject),
                source: "scrapewatch",
                severity,
                timestamp: Utc::now().to_rfc3339(),
                custom_details: serde_json::json!({ "body": notification.body }),
            },
        };

        let request = self.client.post(&self.pagerduty_url).json(&payload);
        self.dispatch(request, "PagerDuty").await?;

        info!("PagerDuty notification sent");
        Ok(())
    }

    async fn dispatch(&self, request: reqwest::RequestBuilder, target: &str) -> Result<()> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::notify(format!("{target}: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::notify(format!(
                "{} returned {}: {}",
                target, status, body
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl OperatorChannel for NotificationSender {
    async fn send(
        &self,
        destination: &NotificationChannel,
        notification: &Notification,
    ) -> Result<()> {
        match destination {
            NotificationChannel::Slack {
                webhook_url,
                channel,
            } => {
                self.send_slack(webhook_url, channel.as_deref(), notification)
                    .await
            }
            NotificationChannel::Webhook { url, headers } => {
                self.send_webhook(url, headers, notification).await
            }
            NotificationChannel::PagerDuty { routing_key } => {
                self.send_pagerduty(routing_key, notification).await
            }
        }
    }
}

/// Composes alert and error messages and sends them to the configured destination
#[derive(Clone)]
pub struct AlertNotifier {
    channel: Arc<dyn OperatorChannel>,
    destination: NotificationChannel,
    windows: WindowConfig,
}

impl AlertNotifier {
    /// Create a notifier for `destination`
    pub fn new(
        channel: Arc<dyn OperatorChannel>,
        destination: NotificationChannel,
        windows: WindowConfig,
    ) -> Self {
        Self {
            channel,
            destination,
            windows,
        }
    }

    /// Destination label
    pub fn destination(&self) -> String {
        self.destination.destination()
    }

    /// Send one composite alert message for `report`
    pub async fn notify(&self, report: &AlertReport) -> Result<()> {
        let notification = compose_alert(report, &self.windows);
        self.channel.send(&self.destination, &notification).await
    }

    /// Send the pipeline failure message
    pub async fn notify_error(&self, stage: &str, error: &Error) -> Result<()> {
        let notification = compose_error(stage, error);
        self.channel.send(&self.destination, &notification).await
    }
}

/// Alert lines followed by a fixed-order summary of the snapshot
pub fn compose_alert(report: &AlertReport, windows: &WindowConfig) -> Notification {
    let s = &report.snapshot;
    let recent = window_label(windows.alert_hours);
    let overall = window_label(windows.analysis_hours);

    let mut body = String::from("Scrape pipeline alerts:\n\n");
    for line in &report.lines {
        let _ = writeln!(body, "- {line}");
    }

    let _ = write!(
        body,
        "\nSummary:\n\
         - Runs in the last {recent}: {}\n\
         - Success rate in the last {recent}: {:.1}%\n\
         - Success rate over the last {overall}: {:.1}%\n\
         - Unique owners: {}\n\
         - Total records: {}\n",
        s.recent_runs, s.recent_success_rate, s.success_rate, s.unique_owners, s.total_records,
    );

    Notification {
        subject: ALERT_SUBJECT.to_string(),
        body,
        severity: Severity::Warning,
    }
}

/// Failure report naming the stage that failed
pub fn compose_error(stage: &str, error: &Error) -> Notification {
    Notification {
        subject: ERROR_SUBJECT.to_string(),
        body: format!(
            "The scrape monitoring run failed while {stage}.\n\n\
             Error: {error}\n\n\
             No metrics were published for this run; the previous values remain current.\n"
        ),
        severity: Severity::Critical,
    }
}

// Slack payload types
#[derive(Debug, Serialize)]
struct SlackPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_emoji: Option<String>,
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    color: String,
    title: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<i64>,
}

// Generic webhook payload
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
    severity: &'a str,
    sent_at: DateTime<Utc>,
}

// PagerDuty payload types
#[derive(Debug, Serialize)]
struct PagerDutyPayload<'a> {
    routing_key: &'a str,
    event_action: &'a str,
    payload: PagerDutyEventPayload<'a>,
}

#[derive(Debug, Serialize)]
struct PagerDutyEventPayload<'a> {
    summary: String,
    source: &'a str,
    severity: &'a str,
    timestamp: String,
    custom_details: serde_json::Value,
}
