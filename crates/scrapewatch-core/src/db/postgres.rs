//! PostgreSQL connection and job record queries

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::models::{JobRecord, JobStatus};

use super::{RecordPage, RecordStore};

/// PostgreSQL connection pool
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
}

impl PostgresPool {
    /// Create a new PostgreSQL connection pool
    pub async fn new(config: &StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Create a pool that connects on first use, so an unreachable database
    /// surfaces on the first record read rather than at start-up
    pub fn connect_lazy(config: &StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy(&config.url)
            .map_err(|e| Error::config(format!("store.url: {e}")))?;

        Ok(Self { pool })
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Migration failed: {}", e)))?;
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Job record store backed by PostgreSQL.
///
/// Pages are keyset-paginated on the surrogate `id`; the cursor is the last id
/// returned. A short page ends the chain.
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
    page_size: u32,
}

impl PostgresRecordStore {
    /// Create a new record store
    pub fn new(pool: &PostgresPool, page_size: u32) -> Self {
        Self {
            pool: pool.pool.clone(),
            page_size,
        }
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn query_page(
        &self,
        table: &str,
        since: &str,
        cursor: Option<&str>,
    ) -> Result<RecordPage> {
        let since = DateTime::parse_from_rfc3339(since)
            .map_err(|e| Error::validation(format!("invalid cutoff '{since}': {e}")))?
            .with_timezone(&Utc);
        let after_id = parse_cursor(cursor)?;

        let rows = sqlx::query(&page_query(table))
            .bind(since)
            .bind(after_id)
            .bind(i64::from(self.page_size))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::store(e.to_string()))?;

        let mut items = Vec::with_capacity(rows.len());
        let mut last_id = after_id;
        for row in &rows {
            last_id = row.try_get("id").map_err(|e| Error::store(e.to_string()))?;
            items.push(row_to_record(row)?);
        }

        let next_cursor = next_cursor(rows.len(), self.page_size, last_id);

        debug!(
            table,
            count = items.len(),
            has_more = next_cursor.is_some(),
            "Fetched record page"
        );

        Ok(RecordPage { items, next_cursor })
    }
}

/// Page query for `table`. The table name is validated as a plain identifier at
/// configuration time.
///
/// Equivalent to `COALESCE("timestamp", midnight UTC of run_date) > $1`, split so
/// that `idx_job_records_timestamp` and the partial `idx_job_records_undated`
/// can serve each branch. Midnight of `run_date` is after the cutoff exactly
/// when `run_date` is after the cutoff's UTC date.
fn page_query(table: &str) -> String {
    format!(
        r#"
        SELECT id, owner_id, run_date, record_count, summary, status, payload, error, "timestamp"
        FROM {table}
        WHERE ("timestamp" > $1
               OR ("timestamp" IS NULL AND run_date > ($1 AT TIME ZONE 'UTC')::date))
          AND id > $2
        ORDER BY id
        LIMIT $3
        "#
    )
}

/// A full page may have a successor; a short page ends the chain
fn next_cursor(rows: usize, page_size: u32, last_id: i64) -> Option<String> {
    (rows > 0 && rows == page_size as usize).then(|| last_id.to_string())
}

/// Unrecognized status text counts as a failed run
fn parse_status(raw: &str, owner_id: &str) -> JobStatus {
    raw.parse::<JobStatus>().unwrap_or_else(|e| {
        warn!(owner_id = %owner_id, error = %e, "Treating unrecognized status as failure");
        JobStatus::Failure
    })
}

fn parse_cursor(cursor: Option<&str>) -> Result<i64> {
    match cursor {
        None => Ok(0),
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| Error::store(format!("invalid continuation cursor '{raw}'"))),
    }
}

fn row_to_record(row: &PgRow) -> Result<JobRecord> {
    let get_err = |e: sqlx::Error| Error::store(e.to_string());

    let owner_id: String = row.try_get("owner_id").map_err(get_err)?;
    let run_date: NaiveDate = row.try_get("run_date").map_err(get_err)?;
    let record_count: i64 = row.try_get("record_count").map_err(get_err)?;
    let status_raw: String = row.try_get("status").map_err(get_err)?;

    let status = parse_status(&status_raw, &owner_id);

    Ok(JobRecord {
        owner_id,
        run_date,
        record_count: u64::try_from(record_count).unwrap_or(0),
        summary: row
            .try_get::<Option<String>, _>("summary")
            .map_err(get_err)?
            .unwrap_or_default(),
        status,
        payload: row.try_get("payload").map_err(get_err)?,
        error: row.try_get("error").map_err(get_err)?,
        timestamp: row.try_get("timestamp").map_err(get_err)?,
    })
}
