//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use swarm_api::ServiceRecord;
use tracing::{debug, error};

use crate::deploy::events::{ndjson, EventSink};
use crate::deploy::service::ServiceRequest;
use crate::deploy::stack::StackRequest;
use crate::errors::DeployerError;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Header naming the authenticated user
pub const USER_HEADER: &str = "x-exo-user";

/// Error payload
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Handler error mapped onto a status code
#[derive(Debug)]
pub enum ApiError {
    MissingUser,
    Deployer(DeployerError),
}

impl From<DeployerError> for ApiError {
    fn from(err: DeployerError) -> Self {
        ApiError::Deployer(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MissingUser => (
                StatusCode::BAD_REQUEST,
                format!("Missing {} header", USER_HEADER),
            ),
            ApiError::Deployer(e) if e.is_not_found() => {
                (StatusCode::NOT_FOUND, "Service not found!".to_string())
            }
            ApiError::Deployer(
                e @ (DeployerError::InvalidRestartPolicy(_) | DeployerError::InvalidDefinition(_)),
            ) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Deployer(e) => {
                error!("Request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

fn user(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::MissingUser)
}

fn streaming(content_type: &'static str, body: Body) -> Response {
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "swarm-deployer".to_string(),
        version: version.version,
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub services: Vec<ServiceRecord>,
}

pub async fn list_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<Json<ListResponse>, ApiError> {
    let user = user(&headers)?;
    let services = state.deployer.list(&user).await?;
    Ok(Json(ListResponse { services }))
}

/// Deploy one service, streaming status events as NDJSON
pub async fn deploy_service_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(mut request): Json<ServiceRequest>,
) -> Result<Response, ApiError> {
    request.user = user(&headers)?;
    debug!("Deploying service {} for {}", request.name, request.user);

    let (sink, rx) = EventSink::channel();
    tokio::spawn(async move {
        let _ = state.deployer.deploy_service(request, sink).await;
    });

    Ok(streaming("application/x-ndjson", Body::from_stream(ndjson(rx))))
}

/// Deploy a stack, streaming status events as NDJSON
pub async fn deploy_stack_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(request): Json<StackRequest>,
) -> Result<Response, ApiError> {
    let user = user(&headers)?;
    debug!("Deploying stack {} for {}", request.base_name, user);

    let (sink, rx) = EventSink::channel();
    tokio::spawn(async move {
        let _ = state.deployer.deploy_stack(request, sink).await;
    });

    Ok(streaming("application/x-ndjson", Body::from_stream(ndjson(rx))))
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub follow: bool,
}

pub async fn logs_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let user = user(&headers)?;
    let logs = state.deployer.logs(&id, &user, query.follow).await?;
    Ok(streaming("text/plain; charset=utf-8", Body::from_stream(logs)))
}

pub async fn remove_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let user = user(&headers)?;
    state.deployer.remove(&id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}
