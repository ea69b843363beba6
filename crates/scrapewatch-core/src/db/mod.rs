//! Database layer for ScrapeWatch
//!
//! Job records are read from PostgreSQL; Redis backs one of the metric sinks.

mod postgres;
mod redis;

pub use postgres::{PostgresPool, PostgresRecordStore};
pub use redis::RedisPool;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::JobRecord;

/// One page of a filtered record query
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    /// Records on this page
    pub items: Vec<JobRecord>,
    /// Cursor for the next page; `None` when the result set is exhausted
    pub next_cursor: Option<String>,
}

/// Read access to the persistent job record store
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch one page of records from `table` whose timestamp is strictly after
    /// `since` (RFC 3339), continuing from `cursor` when given.
    async fn query_page(
        &self,
        table: &str,
        since: &str,
        cursor: Option<&str>,
    ) -> Result<RecordPage>;
}
