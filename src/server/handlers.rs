use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};

use crate::cluster::{
    is_valid_node_name, LifecycleError, Node, OperationStatus, ResourceList, StoreError,
};
use crate::server::state::AppState;

/// Errors surfaced to HTTP clients
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Lifecycle(_) | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(OperationStatus::failure(self.to_string()))).into_response()
    }
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// Register a node, or update it if it already exists
pub async fn add_node(
    State(state): State<AppState>,
    payload: Result<Json<Node>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(node) = payload.map_err(|e| {
        warn!(error = %e, "rejected node payload");
        ApiError::BadRequest(e.body_text())
    })?;

    if !node.metadata.name.is_empty() && !is_valid_node_name(&node.metadata.name) {
        return Err(ApiError::BadRequest(format!(
            "invalid node name '{}'",
            node.metadata.name
        )));
    }

    let deadline = state.request_deadline();
    state
        .service
        .add_node(deadline.token(), node)
        .await
        .map_err(|e| {
            error!(node = %e.node_name(), error = %e, "failed to add node");
            ApiError::from(e)
        })?;

    Ok(StatusCode::ACCEPTED)
}

/// Remove a node and its device metadata
pub async fn delete_node(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::BadRequest("node name is required".to_string()));
    }
    if name.trim() != name {
        return Err(ApiError::BadRequest(format!(
            "node name '{}' has surrounding whitespace",
            name
        )));
    }
    let name = name.as_str();

    let deadline = state.request_deadline();
    state
        .service
        .delete_node(deadline.token(), name)
        .await
        .map_err(|e| {
            error!(node = %name, error = %e, "failed to delete node");
            ApiError::from(e)
        })?;

    Ok(StatusCode::ACCEPTED)
}

/// List registered nodes
pub async fn list_nodes(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let nodes = state.service.store().list_nodes().await?;
    Ok(Json(ResourceList::new("NodeList", nodes)))
}

/// Get a single node
pub async fn get_node(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Node>, ApiError> {
    match state.service.store().get_node(&name).await {
        Ok(node) => Ok(Json(node)),
        Err(e) if e.is_not_found() => Err(ApiError::NotFound(e.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Lifecycle counters
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.metrics().snapshot())
}

/// Create the Axum router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/nodes", get(list_nodes).post(add_node))
        .route("/api/v1/nodes/{name}", get(get_node).delete(delete_node))
        .route("/api/v1/metrics", get(metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
