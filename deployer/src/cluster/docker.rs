//! Docker Engine API client

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, ClientBuilder, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use swarm_api::{
    ContainerSummary, ErrorResponse, Network, NetworkCreate, ObjectVersion, ServiceCreateResponse,
    ServiceRecord, ServiceSpec,
};
use tracing::{debug, error};
use url::Url;

use crate::cluster::{frames, LogOptions, LogStream, Orchestrator};
use crate::errors::DeployerError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default engine socket of a local Docker install
pub const DEFAULT_SOCKET: &str = "unix:///var/run/docker.sock";

/// Orchestrator backed by the Docker Engine HTTP API
pub struct DockerClient {
    client: Client,
    base_url: String,
}

/// Where the engine API listens
#[derive(Debug, Clone, PartialEq, Eq)]
enum Endpoint {
    /// Base URL of a TCP endpoint
    Tcp(String),
    /// Path of a local unix socket
    Socket(PathBuf),
}

impl DockerClient {
    /// Create a client for a `unix://`, `tcp://`, `http://` or `https://` endpoint
    pub fn new(host: &str) -> Result<Self, DeployerError> {
        let builder = Client::builder().connect_timeout(Duration::from_secs(10));

        let (builder, base_url) = match parse_host(host)? {
            Endpoint::Tcp(base_url) => (builder, base_url),
            Endpoint::Socket(path) => {
                (socket_transport(builder, path)?, SOCKET_BASE_URL.to_string())
            }
        };

        Ok(Self {
            client: builder.build()?,
            base_url,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        method: &str,
        path: &str,
        request: RequestBuilder,
    ) -> Result<Response, DeployerError> {
        debug!("{} {}", method, path);
        let response = request.send().await?;
        check_status(method, path, response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, DeployerError> {
        let request = self.client.get(self.url(path)).timeout(REQUEST_TIMEOUT);
        let response = self.send("GET", path, request).await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, path: &str) -> Result<(), DeployerError> {
        let request = self.client.delete(self.url(path)).timeout(REQUEST_TIMEOUT);
        self.send("DELETE", path, request).await?;
        Ok(())
    }
}

/// Authority used for requests routed over a unix socket
const SOCKET_BASE_URL: &str = "http://localhost";

#[cfg(unix)]
fn socket_transport(builder: ClientBuilder, path: PathBuf) -> Result<ClientBuilder, DeployerError> {
    Ok(builder.unix_socket(path))
}

#[cfg(not(unix))]
fn socket_transport(_: ClientBuilder, path: PathBuf) -> Result<ClientBuilder, DeployerError> {
    Err(DeployerError::ConfigError(format!(
        "Unix socket {} is not available on this platform",
        path.display()
    )))
}

fn parse_host(host: &str) -> Result<Endpoint, DeployerError> {
    let url = Url::parse(host)
        .map_err(|e| DeployerError::ConfigError(format!("Invalid Docker host {}: {}", host, e)))?;

    let scheme = match url.scheme() {
        "unix" => {
            if url.path().is_empty() || url.path() == "/" {
                return Err(DeployerError::ConfigError(format!(
                    "Docker host {} has no socket path",
                    host
                )));
            }
            return Ok(Endpoint::Socket(PathBuf::from(url.path())));
        }
        "tcp" | "http" => "http",
        "https" => "https",
        other => {
            return Err(DeployerError::ConfigError(format!(
                "Unsupported Docker host scheme {}",
                other
            )))
        }
    };
    let host_str = url
        .host_str()
        .ok_or_else(|| DeployerError::ConfigError(format!("Docker host {} has no host", host)))?;

    Ok(Endpoint::Tcp(match url.port() {
        Some(port) => format!("{}://{}:{}", scheme, host_str, port),
        None => format!("{}://{}", scheme, host_str),
    }))
}

async fn check_status(
    method: &str,
    path: &str,
    response: Response,
) -> Result<Response, DeployerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.message)
        .unwrap_or(body);
    if status.as_u16() != 404 {
        error!("Docker {} {} failed: {} - {}", method, path, status, message);
    }

    Err(DeployerError::Docker {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl Orchestrator for DockerClient {
    async fn list_services(&self) -> Result<Vec<ServiceRecord>, DeployerError> {
        self.get_json("/services").await
    }

    async fn inspect_service(&self, id: &str) -> Result<ServiceRecord, DeployerError> {
        self.get_json(&format!("/services/{}", id)).await
    }

    async fn create_service(&self, spec: &ServiceSpec) -> Result<String, DeployerError> {
        let path = "/services/create";
        let request = self.client.post(self.url(path)).timeout(REQUEST_TIMEOUT).json(spec);
        let response: ServiceCreateResponse = self.send("POST", path, request).await?.json().await?;
        for warning in response.warnings.iter().flatten() {
            debug!("Service {} created with warning: {}", spec.name, warning);
        }
        Ok(response.id)
    }

    async fn update_service(
        &self,
        id: &str,
        version: ObjectVersion,
        spec: &ServiceSpec,
    ) -> Result<(), DeployerError> {
        let path = format!("/services/{}/update", id);
        let request = self
            .client
            .post(self.url(&path))
            .query(&[("version", version.index)])
            .timeout(REQUEST_TIMEOUT)
            .json(spec);
        self.send("POST", &path, request).await?;
        Ok(())
    }

    async fn remove_service(&self, id: &str) -> Result<(), DeployerError> {
        self.delete(&format!("/services/{}", id)).await
    }

    async fn service_logs(
        &self,
        id: &str,
        options: LogOptions,
    ) -> Result<LogStream, DeployerError> {
        let path = format!("/services/{}/logs", id);
        // no overall timeout: followed logs stay open
        let request = self.client.get(self.url(&path)).query(&[
            ("follow", options.follow),
            ("stdout", options.stdout),
            ("stderr", options.stderr),
            ("timestamps", options.timestamps),
        ]);
        let response = self.send("GET", &path, request).await?;
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(DeployerError::from));
        Ok(frames::demux(chunks))
    }

    async fn list_networks(&self) -> Result<Vec<Network>, DeployerError> {
        self.get_json("/networks").await
    }

    async fn create_network(&self, request: &NetworkCreate) -> Result<String, DeployerError> {
        #[derive(serde::Deserialize)]
        struct NetworkCreateResponse {
            #[serde(rename = "Id")]
            id: String,
        }

        let path = "/networks/create";
        let builder = self.client.post(self.url(path)).timeout(REQUEST_TIMEOUT).json(request);
        let response: NetworkCreateResponse = self.send("POST", path, builder).await?.json().await?;
        Ok(response.id)
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, DeployerError> {
        self.get_json("/containers/json?all=1").await
    }

    async fn remove_container(&self, id: &str) -> Result<(), DeployerError> {
        self.delete(&format!("/containers/{}", id)).await
    }
}
