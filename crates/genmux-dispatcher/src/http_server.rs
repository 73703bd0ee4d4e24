//! HTTP API for the dispatcher
//!
//! Exposes node management, cluster status and request submission as JSON
//! over axum.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use genmux_common::protocol::error::{DispatchError, Result};
use genmux_common::protocol::{GenerationRequest, NodeId, Rejection};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::dispatcher::Dispatcher;
use crate::node::{NodeSpec, NodeUpdate};

/// HTTP server for the dispatcher.
///
/// | Route                 | Operation                   |
/// |-----------------------|-----------------------------|
/// | `GET /__health`       | liveness                    |
/// | `GET /status`         | cluster status              |
/// | `GET /nodes`          | list nodes                  |
/// | `POST /nodes`         | register a node             |
/// | `PATCH /nodes/:id`    | update a node               |
/// | `DELETE /nodes/:id`   | remove a node               |
/// | `POST /generate`      | submit and await a request  |
pub struct HttpServer {
    dispatcher: Arc<Dispatcher>,
}

impl HttpServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Builds the axum router without binding a socket.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/__health", get(health_check))
            .route("/status", get(cluster_status))
            .route("/nodes", get(list_nodes).post(register_node))
            .route("/nodes/:id", patch(update_node).delete(remove_node))
            .route("/generate", axum::routing::post(generate))
            .layer(CorsLayer::permissive())
            .with_state(self.dispatcher.clone())
    }

    /// Binds `addr` and serves until the process exits.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DispatchError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let app = self.router();

        info!(
            "Dispatcher HTTP server listening on {}",
            listener
                .local_addr()
                .map_err(|e| DispatchError::Transport(format!("Failed to get local addr: {}", e)))?
        );

        axum::serve(listener, app)
            .await
            .map_err(|e| DispatchError::Transport(format!("Server error: {}", e)))?;

        Ok(())
    }
}

/// Error body `{"error": ...}` with a status code
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(error: DispatchError) -> Self {
        let status = match error {
            DispatchError::NodeNotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::UnknownNodeKind(_) | DispatchError::InvalidConfig(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::SERVICE_UNAVAILABLE,
        };
        ApiError(status, error.to_string())
    }
}

fn parse_node_id(raw: &str) -> std::result::Result<NodeId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::from(DispatchError::NodeNotFound(raw.to_string())))
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn cluster_status(State(dispatcher): State<Arc<Dispatcher>>) -> impl IntoResponse {
    Json(dispatcher.cluster_status().await)
}

async fn list_nodes(State(dispatcher): State<Arc<Dispatcher>>) -> impl IntoResponse {
    Json(dispatcher.nodes().await)
}

async fn register_node(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(spec): Json<NodeSpec>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let id = dispatcher.register_node(spec).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

async fn update_node(
    State(dispatcher): State<Arc<Dispatcher>>,
    Path(raw_id): Path<String>,
    Json(update): Json<NodeUpdate>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let id = parse_node_id(&raw_id)?;
    if !dispatcher.update_node(id, update).await? {
        return Err(DispatchError::NodeNotFound(raw_id).into());
    }
    Ok(Json(json!({ "updated": true })))
}

async fn remove_node(
    State(dispatcher): State<Arc<Dispatcher>>,
    Path(raw_id): Path<String>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let id = parse_node_id(&raw_id)?;
    if !dispatcher.remove_node(id).await {
        return Err(DispatchError::NodeNotFound(raw_id).into());
    }
    Ok(Json(json!({ "removed": true })))
}

async fn generate(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(request): Json<GenerationRequest>,
) -> Response {
    match dispatcher.submit(request).await {
        Ok(completion) => Json(json!({
            "success": true,
            "request_id": completion.request_id,
            "text": completion.text,
            "served_by": completion.served_by,
            "node_name": completion.node_name,
            "latency_ms": completion.latency_ms(),
            "attempts": completion.attempts,
        }))
        .into_response(),
        Err(error) => {
            let rejection = Rejection::from_error(&error);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": rejection.error,
                    "attempts": rejection.attempts,
                })),
            )
                .into_response()
        }
    }
}
