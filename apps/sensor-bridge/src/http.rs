//! 可选的运维端点（`BRIDGE_HTTP_ADDR` 配置后启用）。
//!
//! - GET /health：进程存活与 Broker 会话状态
//! - GET /metrics：计数指标快照

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use bridge_telemetry::metrics;
use domain::ConnectionState;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

pub fn router(state: watch::Receiver<ConnectionState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(
    addr: &str,
    state: watch::Receiver<ConnectionState>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(target: "bridge.app", addr = %addr, "http_listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
}

async fn health(State(state): State<watch::Receiver<ConnectionState>>) -> impl IntoResponse {
    let current = *state.borrow();
    let status = if current == ConnectionState::Connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "ok": current == ConnectionState::Connected,
            "state": current.as_str(),
        })),
    )
}

async fn get_metrics() -> impl IntoResponse {
    Json(metrics().snapshot())
}
