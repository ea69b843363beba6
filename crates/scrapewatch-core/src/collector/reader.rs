//! Windowed record reads that follow the store's continuation cursors

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::RecordStore;
use crate::error::{Error, Result};
use crate::models::JobRecord;

/// Reads every job record newer than a cutoff, across all pages
#[derive(Clone)]
pub struct RecordReader {
    store: Arc<dyn RecordStore>,
    table: String,
    max_pages: u32,
}

impl RecordReader {
    /// Create a reader over `table`, giving up after `max_pages` pages
    pub fn new(store: Arc<dyn RecordStore>, table: impl Into<String>, max_pages: u32) -> Self {
        Self {
            store,
            table: table.into(),
            max_pages,
        }
    }

    /// Fetch all records from the last `hours_back` hours
    pub async fn fetch_recent(&self, hours_back: u32) -> Result<Vec<JobRecord>> {
        if hours_back == 0 {
            return Err(Error::validation("hours_back must be positive"));
        }
        let cutoff = Utc::now() - Duration::hours(i64::from(hours_back));
        self.fetch_since(cutoff).await
    }

    /// Fetch all records strictly newer than `cutoff`.
    ///
    /// Either every page is read or an error is returned; a partial result set
    /// would under-count.
    pub async fn fetch_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<JobRecord>> {
        // Stored timestamps have microsecond precision.
        let since = cutoff.to_rfc3339_opts(SecondsFormat::Micros, true);
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 1..=self.max_pages {
            let result = self
                .store
                .query_page(&self.table, &since, cursor.as_deref())
                .await
                .map_err(|e| match e {
                    Error::StoreUnavailable(msg) => Error::store(format!("page {page}: {msg}")),
                    other => Error::store(format!("page {page}: {other}")),
                })?;

            debug!(page, count = result.items.len(), "Read record page");
            records.extend(result.items);

            match result.next_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    debug!(pages = page, total = records.len(), since = %since, "Record fetch complete");
                    return Ok(records);
                }
            }
        }

        warn!(max_pages = self.max_pages, "Record store kept returning cursors");
        Err(Error::store(format!(
            "cursor chain did not terminate after {} pages",
            self.max_pages
        )))
    }
}
