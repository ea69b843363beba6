//! Process-wide HTTP client shared by the metric sink and the notifier

use once_cell::sync::OnceCell;
use reqwest::Client;
use std::time::Duration;

use crate::error::{Error, Result};

static CLIENT: OnceCell<Client> = OnceCell::new();

/// Request timeout for outbound calls
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Get the shared client, building it on first use
pub fn shared_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("scrapewatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::internal(format!("failed to create HTTP client: {e}")))
    })
}
