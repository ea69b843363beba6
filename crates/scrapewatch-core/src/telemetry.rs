//! Self-monitoring: logging setup and pipeline counters
//!
//! Counters go through the `metrics` facade and are no-ops until a recorder is
//! installed. `serve` installs the Prometheus recorder and renders it on
//! `/metrics`.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Pipeline runs by outcome (`success` | `failed`)
pub const RUNS_TOTAL: &str = "scrapewatch_runs_total";
/// Records fetched by the latest run
pub const RECORDS_FETCHED: &str = "scrapewatch_records_fetched";
/// Alert lines fired
pub const ALERTS_FIRED_TOTAL: &str = "scrapewatch_alerts_fired_total";
/// Alert or error notifications that could not be delivered
pub const NOTIFY_FAILURES_TOTAL: &str = "scrapewatch_notify_failures_total";
/// Wall time of a run
pub const RUN_DURATION_SECONDS: &str = "scrapewatch_run_duration_seconds";

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder once and return its handle
pub fn install_prometheus() -> Result<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::internal(format!("failed to install metrics recorder: {e}")))?;

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Initialize tracing.
///
/// `RUST_LOG` wins over the configured level; `verbose` forces debug. The
/// returned guard flushes the log file and must be held until exit.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<Option<WorkerGuard>> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let json = config.format.eq_ignore_ascii_case("json");

    let stdout_layer = if json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(false).boxed()
    };

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "scrapewatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::internal(format!("failed to initialize logging: {e}")))?;

    Ok(guard)
}
