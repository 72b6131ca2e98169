//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::errors::DeployerError;
use crate::server::handlers::{
    deploy_service_handler, deploy_stack_handler, health_handler, list_handler, logs_handler,
    remove_handler,
};
use crate::server::state::ServerState;
use crate::storage::settings::ServerSettings;

/// Build the router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Queries
        .route("/list", get(list_handler))
        .route("/logs/{id}", get(logs_handler))
        // Mutations
        .route("/deploy/service", post(deploy_service_handler))
        .route("/deploy/stack", post(deploy_stack_handler))
        .route("/remove/{id}", post(remove_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerSettings,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), DeployerError>>, DeployerError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DeployerError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| DeployerError::ServerError(e.to_string()))
    });

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use swarm_api::ServiceSpec;
    use tower::ServiceExt;

    use crate::cluster::memory::MemoryCluster;
    use crate::config::SwarmConfig;
    use crate::deploy::command::ScriptedRunner;
    use crate::deploy::Deployer;
    use crate::labels::{PROJECT, USER};
    use crate::server::handlers::ErrorBody;

    async fn app() -> (Router, Arc<MemoryCluster>) {
        let cluster = Arc::new(MemoryCluster::new());
        let mut spec = ServiceSpec {
            name: "blog".to_string(),
            ..Default::default()
        };
        spec.labels.insert(USER.to_string(), "admin".to_string());
        spec.labels.insert(PROJECT.to_string(), "blog".to_string());
        cluster.with_service(spec).await;

        let deployer = Deployer::new(
            cluster.clone(),
            Arc::new(ScriptedRunner::new(&[], 0)),
            SwarmConfig::default(),
        );
        let state = Arc::new(ServerState::new(Arc::new(deployer)));
        (router(state), cluster)
    }

    fn request(method: &str, uri: &str, user: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-exo-user", user);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app().await;
        let response = app.oneshot(request("GET", "/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_user_rejected() {
        let (app, _) = app().await;
        let response = app.oneshot(request("GET", "/list", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_remove_unknown_is_404() {
        let (app, _) = app().await;
        let response = app
            .oneshot(request("POST", "/remove/missing", Some("admin")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.error, "Service not found!");
    }

    #[tokio::test]
    async fn test_remove_returns_no_content() {
        let (app, cluster) = app().await;
        let response = app
            .oneshot(request("POST", "/remove/blog", Some("admin")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(cluster.services().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_scoped_to_user() {
        let (app, _) = app().await;
        let response = app
            .oneshot(request("GET", "/list", Some("guest")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["services"].as_array().unwrap().len(), 0);
    }
}
