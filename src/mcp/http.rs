//! HTTP transport
//!
//! `/sse` answers with the single response envelope framed as one
//! server-sent event; `/mcp` answers with plain JSON. Both sit behind the
//! API key check. `/health` is open.

use axum::{
    body::Bytes,
    extract::{Query, Request, State},
    http::{header, HeaderName, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::auth::AuthGuard;
use super::dispatcher::Dispatcher;
use super::protocol::{RpcError, RpcResponse};
use crate::search::calibration::Diagnostics;

#[derive(Clone)]
pub struct HttpState {
    pub dispatcher: Arc<Dispatcher>,
    pub guard: AuthGuard,
    pub diagnostics: Arc<Diagnostics>,
}

#[derive(Debug, Deserialize)]
struct AuthQuery {
    api_key: Option<String>,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/sse", get(sse_endpoint).post(sse_endpoint))
        .route("/mcp", post(json_endpoint))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(addr: SocketAddr, state: HttpState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Neural memory listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn require_api_key(State(state): State<HttpState>, req: Request, next: Next) -> Response {
    let query_key = Query::<AuthQuery>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(q)| q.api_key);
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if state.guard.authorize_request(query_key.as_deref(), authorization) {
        return next.run(req).await;
    }

    tracing::warn!(
        method = %req.method(),
        path = %req.uri().path(),
        "Rejected unauthorized request"
    );
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Unauthorized" })),
    )
        .into_response()
}

async fn sse_endpoint(State(state): State<HttpState>, body: Bytes) -> Response {
    let response = dispatch(&state, body).await;
    let payload = serde_json::to_string(&response).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize response");
        r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#
            .to_string()
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        format!("data: {}\n\n", payload),
    )
        .into_response()
}

async fn json_endpoint(State(state): State<HttpState>, body: Bytes) -> Json<RpcResponse> {
    Json(dispatch(&state, body).await)
}

async fn health(State(state): State<HttpState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "embedding_consistency": state.diagnostics.consistency(),
    }))
}

/// Store and embedding calls block; keep them off the async workers
async fn dispatch(state: &HttpState, body: Bytes) -> RpcResponse {
    let dispatcher = state.dispatcher.clone();
    match tokio::task::spawn_blocking(move || dispatcher.handle_body(&body)).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Dispatch task failed");
            RpcResponse::error(Value::Null, RpcError::internal())
        }
    }
}
