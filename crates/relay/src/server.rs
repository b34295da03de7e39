use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::metrics::encode_metrics;
use crate::runner::RunnerState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub instance: String,
    pub state: RunnerState,
}

/// Shared state for health endpoints
#[derive(Clone)]
pub struct ServerState {
    pub instance_name: String,
    pub state: watch::Receiver<RunnerState>,
}

impl ServerState {
    pub fn new(instance_name: impl Into<String>, state: watch::Receiver<RunnerState>) -> Self {
        Self {
            instance_name: instance_name.into(),
            state,
        }
    }

    fn current(&self) -> RunnerState {
        *self.state.borrow()
    }
}

/// Health endpoint - always returns 200 if server is running
async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        instance: state.instance_name.clone(),
        state: state.current(),
    })
}

/// Ready endpoint - returns 200 only while the relay is consuming
async fn ready(State(state): State<ServerState>) -> (StatusCode, Json<HealthResponse>) {
    let current = state.current();
    let running = current == RunnerState::Running;
    let status_code = if running {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if running { "ready" } else { "not_ready" }.to_string(),
            instance: state.instance_name.clone(),
            state: current,
        }),
    )
}

async fn metrics() -> impl IntoResponse {
    match encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Create the health server router
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Run the health server
pub async fn run_server(addr: SocketAddr, state: ServerState) -> std::io::Result<()> {
    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RelayMetrics;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn create_test_state(state: RunnerState) -> (watch::Sender<RunnerState>, ServerState) {
        let (tx, rx) = watch::channel(state);
        (tx, ServerState::new("test-nanobot", rx))
    }

    async fn get_path(state: ServerState, uri: &str) -> axum::response::Response {
        create_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_returns_ok_in_any_state() {
        for runner_state in [RunnerState::Idle, RunnerState::Stopped] {
            let (_tx, state) = create_test_state(runner_state);
            let response = get_path(state, "/health").await;
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_health_reports_instance_and_state() {
        let (_tx, state) = create_test_state(RunnerState::Draining);
        let response = get_path(state, "/health").await;

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["instance"], "test-nanobot");
        assert_eq!(json["state"], "draining");
    }

    #[tokio::test]
    async fn test_ready_only_while_running() {
        let (tx, state) = create_test_state(RunnerState::Idle);

        let response = get_path(state.clone(), "/ready").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        tx.send_replace(RunnerState::Running);
        let response = get_path(state.clone(), "/ready").await;
        assert_eq!(response.status(), StatusCode::OK);

        tx.send_replace(RunnerState::Draining);
        let response = get_path(state, "/ready").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        RelayMetrics::new("server-test").inc_forwarded();
        let (_tx, state) = create_test_state(RunnerState::Running);

        let response = get_path(state, "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("anyker_relay_messages_total"));
    }
}
