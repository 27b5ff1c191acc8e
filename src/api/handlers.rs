//! HTTP API handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};

use crate::arbitrage::Opportunity;
use crate::scanner::{ScannerHandle, ScannerState};

/// Opportunities returned when no limit is given.
pub const DEFAULT_OPPORTUNITY_LIMIT: usize = 50;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether the scanner finished starting up.
    pub ready: Arc<AtomicBool>,
    /// Scanner status and stop control.
    pub scanner: ScannerHandle,
    /// Prometheus renderer, when the recorder is installed.
    pub prometheus: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("ready", &self.is_ready())
            .field("scanner", &self.scanner)
            .field("prometheus", &self.prometheus.is_some())
            .finish()
    }
}

impl AppState {
    /// Create new app state.
    pub fn new(scanner: ScannerHandle) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            scanner,
            prometheus: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether the scanner is scanning.
    pub ready: bool,
    /// Scanner state.
    pub state: ScannerState,
}

/// `GET /api/v1/opportunities` query.
#[derive(Debug, Deserialize)]
pub struct OpportunitiesQuery {
    /// Maximum number returned, newest first.
    pub limit: Option<usize>,
}

/// Recent opportunities.
#[derive(Debug, Serialize)]
pub struct OpportunitiesResponse {
    /// Number returned.
    pub count: usize,
    /// Newest first.
    pub opportunities: Vec<Opportunity>,
}

/// Stop request acknowledgement.
#[derive(Debug, Serialize)]
pub struct StopResponse {
    /// Always true once the request is recorded.
    pub stopping: bool,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 while scanning, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let scanner_state = state.scanner.state().await;
    let ready = state.is_ready() && scanner_state == ScannerState::Scanning;

    let response = ReadyResponse {
        ready,
        state: scanner_state,
    };

    if ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - scanner counters, schedule and credential pool.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scanner.status().await)
}

/// Recent opportunities handler.
pub async fn opportunities(
    State(state): State<AppState>,
    Query(query): Query<OpportunitiesQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_OPPORTUNITY_LIMIT);
    let opportunities = state.scanner.recent_opportunities(limit).await;
    Json(OpportunitiesResponse {
        count: opportunities.len(),
        opportunities,
    })
}

/// Stop handler - asks the scan loop to stop at its next boundary.
pub async fn stop(State(state): State<AppState>) -> impl IntoResponse {
    state.scanner.stop();
    state.set_ready(false);
    (StatusCode::ACCEPTED, Json(StopResponse { stopping: true }))
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
