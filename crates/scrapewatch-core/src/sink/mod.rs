//! Monitoring sinks and the snapshot publisher
//!
//! A snapshot is flattened into one data point per field and delivered as a
//! single batch. Partial acceptance fails the whole publish.

mod http;
mod redis;

pub use self::http::HttpMetricsSink;
pub use self::redis::RedisMetricsSink;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{SinkBackend, SinkConfig};
use crate::db::RedisPool;
use crate::error::{Error, Result};
use crate::models::{MetricDatum, MetricsSnapshot};

/// Write-only destination for metric batches
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Deliver a batch of data points under `namespace`, all or nothing
    async fn put_metric_data(&self, namespace: &str, data: &[MetricDatum]) -> Result<()>;
}

/// Build the sink selected by configuration
pub fn from_config(config: &SinkConfig) -> Result<Arc<dyn MetricsSink>> {
    let sink: Arc<dyn MetricsSink> = match &config.backend {
        SinkBackend::Http { endpoint } => Arc::new(HttpMetricsSink::new(endpoint.clone())?),
        SinkBackend::Redis { url } => Arc::new(RedisMetricsSink::new(RedisPool::new(url)?)),
    };
    Ok(sink)
}

/// Publishes snapshots to a [`MetricsSink`]
#[derive(Clone)]
pub struct MetricsPublisher {
    sink: Arc<dyn MetricsSink>,
    namespace: String,
}

impl MetricsPublisher {
    /// Create a publisher writing under `namespace`
    pub fn new(sink: Arc<dyn MetricsSink>, namespace: impl Into<String>) -> Self {
        Self {
            sink,
            namespace: namespace.into(),
        }
    }

    /// Publish every snapshot field, stamped with the current time
    pub async fn publish(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        let data = snapshot.to_data_points(Utc::now());
        debug!(namespace = %self.namespace, points = data.len(), "Publishing metrics");

        self.sink
            .put_metric_data(&self.namespace, &data)
            .await
            .map_err(|e| match e {
                Error::PublishFailed(_) => e,
                other => Error::publish(other.to_string()),
            })?;

        info!(namespace = %self.namespace, points = data.len(), "Metrics published");
        Ok(())
    }
}
