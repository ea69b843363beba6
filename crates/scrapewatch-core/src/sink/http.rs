//! HTTP ingest sink

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::MetricDatum;

use super::MetricsSink;

/// Posts metric batches as JSON to an ingest endpoint
pub struct HttpMetricsSink {
    client: &'static Client,
    endpoint: String,
}

impl HttpMetricsSink {
    /// Create a sink posting to `endpoint`
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: crate::http::shared_client()?,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl MetricsSink for HttpMetricsSink {
    async fn put_metric_data(&self, namespace: &str, data: &[MetricDatum]) -> Result<()> {
        let payload = IngestPayload {
            namespace,
            metric_data: data
                .iter()
                .map(|d| IngestDatum {
                    metric_name: &d.name,
                    value: d.value,
                    unit: d.unit.as_str(),
                    timestamp: d.timestamp,
                })
                .collect(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::publish(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(Error::publish(format!(
                "Sink returned {}: {}",
                status, body
            )));
        }

        // An empty or non-JSON body means the whole batch was accepted.
        if let Ok(ack) = serde_json::from_str::<IngestResponse>(&body) {
            if ack.rejected > 0 {
                return Err(Error::publish(format!(
                    "Sink rejected {} of {} data points",
                    ack.rejected,
                    data.len()
                )));
            }
        }

        debug!(endpoint = %self.endpoint, points = data.len(), "Batch accepted");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct IngestPayload<'a> {
    namespace: &'a str,
    metric_data: Vec<IngestDatum<'a>>,
}

#[derive(Debug, Serialize)]
struct IngestDatum<'a> {
    metric_name: &'a str,
    value: f64,
    unit: &'static str,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct IngestResponse {
    #[serde(default)]
    rejected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricsSnapshot;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn data() -> Vec<MetricDatum> {
        MetricsSnapshot {
            total_runs: 10,
            successful_runs: 7,
            failed_runs: 3,
            success_rate: 70.0,
            ..Default::default()
        }
        .to_data_points(Utc::now())
    }

    #[tokio::test]
    async fn test_posts_single_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ingest"))
            .and(body_partial_json(serde_json::json!({ "namespace": "Scrapers/Prod" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = HttpMetricsSink::new(format!("{}/ingest", server.uri())).unwrap();
        sink.put_metric_data("Scrapers/Prod", &data()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = requests[0].body_json().unwrap();
        let points = body["metric_data"].as_array().unwrap();
        assert_eq!(points.len(), 9);
        assert_eq!(points[3]["metric_name"], "SuccessRate");
        assert_eq!(points[3]["value"], 70.0);
        assert_eq!(points[3]["unit"], "Percent");
    }

    #[tokio::test]
    async fn test_partial_acceptance_fails_publish() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "accepted": 7, "rejected": 2 })),
            )
            .mount(&server)
            .await;

        let sink = HttpMetricsSink::new(server.uri()).unwrap();
        let err = sink.put_metric_data("ns", &data()).await.unwrap_err();
        assert!(matches!(err, Error::PublishFailed(ref m) if m.contains("rejected 2 of 9")));
    }

    #[tokio::test]
    async fn test_error_status_fails_publish() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let sink = HttpMetricsSink::new(server.uri()).unwrap();
        let err = sink.put_metric_data("ns", &data()).await.unwrap_err();
        assert!(matches!(err, Error::PublishFailed(ref m) if m.contains("503")));
    }

    #[tokio::test]
    async fn test_unreachable_sink_fails_publish() {
        let sink = HttpMetricsSink::new("http://127.0.0.1:9/ingest").unwrap();
        assert!(matches!(
            sink.put_metric_data("ns", &data()).await,
            Err(Error::PublishFailed(_))
        ));
    }
}
