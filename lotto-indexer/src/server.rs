// Copyright (c) BCLot, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Operator API: connection status per chain, health, Prometheus metrics and
//! the force-reconnect escape hatch.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use prometheus::{Registry, TextEncoder};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::supervisor::{ChainState, ConnectionSupervisor};

pub struct ApiState {
    pub supervisor: Arc<ConnectionSupervisor>,
    pub registry: Registry,
}

pub fn create_api_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/status", get(status_all))
        .route("/status/:chain", get(status_one))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/chains/:chain/reconnect", post(force_reconnect))
        .with_state(state)
}

pub async fn run_api_server(
    address: SocketAddr,
    state: Arc<ApiState>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let router = create_api_router(state);
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("API server listening on {address}");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

async fn status_all(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.supervisor.status_all())
}

async fn status_one(
    State(state): State<Arc<ApiState>>,
    Path(chain): Path<String>,
) -> impl IntoResponse {
    match state.supervisor.status(&chain) {
        Ok(status) => Json(status).into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("unknown chain: {chain}") })),
        )
            .into_response(),
    }
}

/// Healthy means every chain is connected or still working on it; a chain
/// parked in Failed flips the service unhealthy.
async fn health_check(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let statuses = state.supervisor.status_all();
    let failed: Vec<&str> = statuses
        .iter()
        .filter(|(_, s)| s.state == ChainState::Failed)
        .map(|(name, _)| name.as_str())
        .collect();
    if failed.is_empty() {
        Json(serde_json::json!({ "status": "ok" })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "degraded", "failed_chains": failed })),
        )
            .into_response()
    }
}

async fn metrics(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match TextEncoder::new().encode_to_string(&state.registry.gather()) {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {e}"),
        )
            .into_response(),
    }
}

async fn force_reconnect(
    State(state): State<Arc<ApiState>>,
    Path(chain): Path<String>,
) -> impl IntoResponse {
    match state.supervisor.force_reconnect(&chain).await {
        Ok(()) => Json(serde_json::json!({ "status": "reconnecting", "chain": chain }))
            .into_response(),
        Err(_) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("unknown chain: {chain}") })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::config::{ChainConfig, ChainKind, IndexerConfig};
    use crate::metrics::IndexerMetrics;
    use crate::notify::{LogAutomationTrigger, LogWinNotifier};
    use crate::store::mem::MemStore;

    fn api_state() -> Arc<ApiState> {
        let registry = Registry::new();
        let metrics = Arc::new(IndexerMetrics::new(&registry));
        let config = Arc::new(IndexerConfig {
            chains: vec![ChainConfig {
                chain_name: "bsc".to_string(),
                kind: ChainKind::Evm,
                rpc_url: "http://localhost:8545".to_string(),
                chain_id: 56,
                contract_addresses: vec!["0xlotto".to_string()],
                start_position: 0,
                poll_interval_ms: 3_000,
            }],
            blocks_behind_threshold: 16,
            health_probe_interval_ms: 10_000,
            reconnect_base_delay_ms: 5_000,
            max_reconnect_attempts: 5,
            max_chunk_size: 10_000,
            rate_limit_max_retries: 5,
            event_channel_size: 64,
        });
        let supervisor = Arc::new(ConnectionSupervisor::new(
            config,
            Arc::new(MemStore::new()),
            Arc::new(LogWinNotifier),
            Arc::new(LogAutomationTrigger),
            metrics,
        ));
        Arc::new(ApiState {
            supervisor,
            registry,
        })
    }

    #[tokio::test]
    async fn test_health_ok_when_no_chain_failed() {
        let router = create_api_router(api_state());
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_chain_is_404() {
        let router = create_api_router(api_state());
        let response = router
            .oneshot(Request::get("/status/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_renders() {
        let router = create_api_router(api_state());
        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
