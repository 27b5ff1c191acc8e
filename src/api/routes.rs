//! HTTP API route definitions.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::{health, metrics, opportunities, ready, status, stop, AppState};

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Scanner endpoints
        .route("/api/v1/status", get(status))
        .route("/api/v1/opportunities", get(opportunities))
        .route("/api/v1/stop", post(stop))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialPool, MemoryCredentialStore};
    use crate::market::MockOddsFeed;
    use crate::outbound::NullNotifier;
    use crate::scanner::{Scanner, ScannerSettings};
    use crate::scheduler::Scheduler;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::sync::Arc;
    use time::UtcOffset;
    use tower::ServiceExt;

    async fn app_state() -> AppState {
        let pool = CredentialPool::new(Arc::new(MemoryCredentialStore::with_keys(2)), None);
        pool.load().await.unwrap();
        let scanner = Scanner::new(
            Arc::new(MockOddsFeed::new()),
            Arc::new(pool),
            Scheduler::with_default_slots(UtcOffset::UTC).unwrap(),
            ScannerSettings::default(),
        )
        .with_notifier(Arc::new(NullNotifier));
        AppState::new(scanner.handle())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = create_router(app_state().await);
        let (status, body) = get_json(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn ready_endpoint_follows_ready_flag() {
        let state = app_state().await;

        let (status, _) = get_json(create_router(state.clone()), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        state.set_ready(true);
        let (status, body) = get_json(create_router(state), "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "scanning");
    }

    #[tokio::test]
    async fn status_endpoint_includes_pool() {
        let app = create_router(app_state().await);
        let (status, body) = get_json(app, "/api/v1/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "scanning");
        assert_eq!(body["scan_count"], 0);
        assert_eq!(body["credentials"]["total"], 2);
        assert_eq!(body["credentials"]["active_identifier"], "user0");
    }

    #[tokio::test]
    async fn opportunities_endpoint_starts_empty() {
        let app = create_router(app_state().await);
        let (status, body) = get_json(app, "/api/v1/opportunities?limit=5").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
        assert!(body["opportunities"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stop_endpoint_requests_stop() {
        let state = app_state().await;
        state.set_ready(true);
        let app = create_router(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/stop")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(state.scanner.is_stop_requested());
        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn metrics_endpoint_needs_recorder() {
        let app = create_router(app_state().await);
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
