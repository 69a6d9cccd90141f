//! # Squall Server
//!
//! HTTP control surface for the remote search protocol:
//! - `POST /remoteSearch/v1/start` with a JSON `ClusterSearchTask`
//! - `GET /remoteSearch/v1/poll?queryKey=K` returning the binary frame
//! - `GET /remoteSearch/v1/destroy?queryKey=K`
//! - `/health` liveness probe

pub mod broadcast;

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use squall_common::prelude::*;
use squall_search::{ClusterSearchTask, RemoteSearchManager};

pub use broadcast::HttpTerminationBroadcaster;

/// Request bodies above this are rejected outright.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Shared state for the control surface handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<RemoteSearchManager>,
}

/// Build the full router with middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/remoteSearch/v1/start", post(start_handler))
        .route("/remoteSearch/v1/poll", get(poll_handler))
        .route("/remoteSearch/v1/destroy", get(destroy_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Error wrapper translating domain errors into HTTP responses.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_, _) => StatusCode::NOT_FOUND,
            Error::Search(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct KeyParams {
    #[serde(rename = "queryKey")]
    query_key: String,
}

async fn start_handler(
    State(state): State<AppState>,
    Json(task): Json<ClusterSearchTask>,
) -> ApiResult<Json<bool>> {
    debug!(query_key = %task.query_key, shards = task.shard_ids.len(), "start request");
    let accepted = state.manager.start(task)?;
    Ok(Json(accepted))
}

async fn poll_handler(
    State(state): State<AppState>,
    Query(params): Query<KeyParams>,
) -> ApiResult<Response> {
    let key = QueryKey(params.query_key);
    let frame = state.manager.poll(&key).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        frame,
    )
        .into_response())
}

async fn destroy_handler(
    State(state): State<AppState>,
    Query(params): Query<KeyParams>,
) -> Json<bool> {
    let key = QueryKey(params.query_key);
    Json(state.manager.destroy(&key))
}

async fn health_handler() -> &'static str {
    "ok"
}
