//! Redis stream sink

use async_trait::async_trait;
use tracing::debug;

use crate::db::RedisPool;
use crate::error::{Error, Result};
use crate::models::MetricDatum;

use super::MetricsSink;

/// Appends data points to `<namespace>:metrics` and mirrors the latest values
/// into the hash `<namespace>:latest`, in one MULTI/EXEC transaction
#[derive(Clone)]
pub struct RedisMetricsSink {
    pool: RedisPool,
}

impl RedisMetricsSink {
    /// Create a new Redis sink
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricsSink for RedisMetricsSink {
    async fn put_metric_data(&self, namespace: &str, data: &[MetricDatum]) -> Result<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| Error::publish(e.to_string()))?;

        let pipe = batch_pipeline(namespace, data);

        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::publish(format!("Redis transaction failed: {e}")))?;

        debug!(namespace, points = data.len(), "Batch written");
        Ok(())
    }
}

/// One MULTI/EXEC transaction: an `XADD` to `<namespace>:metrics` and an `HSET`
/// on `<namespace>:latest` per data point
fn batch_pipeline(namespace: &str, data: &[MetricDatum]) -> redis::Pipeline {
    let stream = format!("{namespace}:metrics");
    let latest = format!("{namespace}:latest");

    let mut pipe = redis::pipe();
    pipe.atomic();
    for datum in data {
        pipe.cmd("XADD")
            .arg(&stream)
            .arg("*")
            .arg("name")
            .arg(&datum.name)
            .arg("value")
            .arg(datum.value)
            .arg("unit")
            .arg(datum.unit.as_str())
            .arg("timestamp")
            .arg(datum.timestamp.to_rfc3339())
            .ignore();
        pipe.cmd("HSET")
            .arg(&latest)
            .arg(&datum.name)
            .arg(datum.value)
            .ignore();
    }
    pipe
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricsSnapshot;
    use chrono::Utc;

    fn packed(pipe: &redis::Pipeline) -> String {
        String::from_utf8_lossy(&pipe.get_packed_pipeline()).into_owned()
    }

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn test_batch_is_one_transaction() {
        let data = MetricsSnapshot::default().to_data_points(Utc::now());
        let wire = packed(&batch_pipeline("Scrapers/Prod", &data));

        assert!(wire.starts_with("*1\r\n$5\r\nMULTI\r\n"), "{wire}");
        assert!(wire.ends_with("*1\r\n$4\r\nEXEC\r\n"), "{wire}");
        assert_eq!(count(&wire, "MULTI"), 1);
        assert_eq!(count(&wire, "EXEC"), 1);
    }

    #[test]
    fn test_every_point_is_streamed_and_mirrored() {
        let data = MetricsSnapshot::default().to_data_points(Utc::now());
        let wire = packed(&batch_pipeline("Scrapers/Prod", &data));

        assert_eq!(count(&wire, "XADD"), data.len());
        assert_eq!(count(&wire, "HSET"), data.len());
        assert_eq!(count(&wire, "Scrapers/Prod:metrics"), data.len());
        assert_eq!(count(&wire, "Scrapers/Prod:latest"), data.len());
        assert!(wire.contains("RecentSuccessRate"));
    }
}
