//! Status server handlers

use axum::{extract::State, http::StatusCode, Json};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::collector::{ServiceStatus, StatusBoard};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Scheduler progress
    pub status: StatusBoard,
    /// Self-metrics recorder, when installed
    pub metrics: Option<PrometheusHandle>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests
    pub status: String,
    /// Crate version
    pub version: String,
    /// Completed invocations
    pub runs: u64,
    /// Whether the most recent invocation failed
    pub last_run_failed: bool,
}

/// Liveness plus a one-line view of the last run
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.status.snapshot();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        runs: status.runs,
        last_run_failed: status.last_error.is_some(),
    })
}

/// Full scheduler status including the last snapshot and alerts
pub async fn status(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(state.status.snapshot())
}

/// Prometheus exposition of the service's own counters
pub async fn metrics(State(state): State<AppState>) -> Result<String, (StatusCode, String)> {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .ok_or((StatusCode::NOT_FOUND, "Metrics recorder not installed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn state() -> AppState {
        AppState {
            status: StatusBoard::new(),
            metrics: None,
        }
    }

    #[tokio::test]
    async fn test_health_reports_last_failure() {
        let state = state();
        state
            .status
            .record_failure(Utc::now(), "Record store unavailable: page 1".to_string());

        let Json(health) = health(State(state)).await;

        assert_eq!(health.status, "ok");
        assert_eq!(health.runs, 1);
        assert!(health.last_run_failed);
    }

    #[tokio::test]
    async fn test_status_serializes_empty_board() {
        let Json(status) = status(State(state())).await;

        let value = serde_json::to_value(status).unwrap();
        assert_eq!(value["runs"], 0);
        assert!(value["last_outcome"].is_null());
    }

    #[tokio::test]
    async fn test_metrics_without_recorder_is_not_found() {
        let err = metrics(State(state())).await.unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }
}
