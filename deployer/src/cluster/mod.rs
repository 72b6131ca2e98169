//! Orchestrator capability
//!
//! Everything the engine needs from the cluster, expressed as one trait so the
//! engine can run against the Docker Engine API or an in-memory cluster.

pub mod docker;
pub mod frames;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use swarm_api::{
    ContainerSummary, Network, NetworkCreate, ObjectVersion, ServiceRecord, ServiceSpec,
};

use crate::errors::DeployerError;

/// Stream of raw log bytes
pub type LogStream = BoxStream<'static, Result<Bytes, DeployerError>>;

/// Options for service log retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    pub follow: bool,
    pub stdout: bool,
    pub stderr: bool,
    pub timestamps: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            follow: false,
            stdout: true,
            stderr: true,
            timestamps: true,
        }
    }
}

impl LogOptions {
    pub fn follow(follow: bool) -> Self {
        Self {
            follow,
            ..Default::default()
        }
    }
}

/// Container orchestrator client
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// List all services in the cluster
    async fn list_services(&self) -> Result<Vec<ServiceRecord>, DeployerError>;

    /// Inspect one service by ID or name
    async fn inspect_service(&self, id: &str) -> Result<ServiceRecord, DeployerError>;

    /// Create a service, returning its ID
    async fn create_service(&self, spec: &ServiceSpec) -> Result<String, DeployerError>;

    /// Replace a service's spec; `version` must be the last observed version
    async fn update_service(
        &self,
        id: &str,
        version: ObjectVersion,
        spec: &ServiceSpec,
    ) -> Result<(), DeployerError>;

    /// Remove a service
    async fn remove_service(&self, id: &str) -> Result<(), DeployerError>;

    /// Open a service's log stream, already stripped of stream framing
    async fn service_logs(
        &self,
        id: &str,
        options: LogOptions,
    ) -> Result<LogStream, DeployerError>;

    async fn list_networks(&self) -> Result<Vec<Network>, DeployerError>;

    /// Create a network, returning its ID
    async fn create_network(&self, request: &NetworkCreate) -> Result<String, DeployerError>;

    /// List all containers, including stopped ones
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, DeployerError>;

    async fn remove_container(&self, id: &str) -> Result<(), DeployerError>;
}
