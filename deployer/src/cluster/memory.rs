//! In-memory orchestrator
//!
//! Keeps services, networks and containers in insertion order and behaves like
//! the engine for the calls the deployer makes: name conflicts on create,
//! version checks on update, and 404s for unknown IDs.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use swarm_api::{
    ContainerSummary, Network, NetworkCreate, ObjectVersion, ServiceRecord, ServiceSpec,
};
use tokio::sync::RwLock;

use crate::cluster::{LogOptions, LogStream, Orchestrator};
use crate::errors::DeployerError;

#[derive(Default)]
struct State {
    services: Vec<ServiceRecord>,
    networks: Vec<Network>,
    containers: Vec<ContainerSummary>,
    logs: HashMap<String, Vec<Bytes>>,
    removal_failures: HashMap<String, (u16, String)>,
    next_id: u64,
    mutations: u64,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{:04}", prefix, self.next_id)
    }

    fn find_service(&self, id: &str) -> Option<usize> {
        self.services
            .iter()
            .position(|s| s.id == id)
            .or_else(|| self.services.iter().position(|s| s.spec.name == id))
    }
}

fn not_found(kind: &str, id: &str) -> DeployerError {
    DeployerError::Docker {
        status: 404,
        message: format!("{} {} not found", kind, id),
    }
}

/// Orchestrator that lives entirely in memory
#[derive(Default)]
pub struct MemoryCluster {
    state: RwLock<State>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a service without counting it as a mutation
    pub async fn with_service(&self, spec: ServiceSpec) -> String {
        let mut state = self.state.write().await;
        let id = state.next_id("svc");
        state.services.push(ServiceRecord {
            id: id.clone(),
            version: ObjectVersion { index: 1 },
            spec,
            ..Default::default()
        });
        id
    }

    /// Set the log chunks a service streams back
    pub async fn set_logs(&self, id: &str, chunks: Vec<&str>) {
        let mut state = self.state.write().await;
        state.logs.insert(
            id.to_string(),
            chunks.into_iter().map(|c| Bytes::from(c.to_string())).collect(),
        );
    }

    pub async fn add_container(&self, container: ContainerSummary) {
        self.state.write().await.containers.push(container);
    }

    pub async fn add_network(&self, name: &str) -> String {
        let mut state = self.state.write().await;
        let id = state.next_id("net");
        state.networks.push(Network {
            id: id.clone(),
            name: name.to_string(),
            driver: Some("overlay".to_string()),
            scope: Some("swarm".to_string()),
        });
        id
    }

    /// Make the next removal of `id` fail with the given engine status
    pub async fn inject_removal_failure(&self, id: &str, status: u16, message: &str) {
        self.state
            .write()
            .await
            .removal_failures
            .insert(id.to_string(), (status, message.to_string()));
    }

    /// Number of create, update and remove calls served so far
    pub async fn mutations(&self) -> u64 {
        self.state.read().await.mutations
    }

    pub async fn services(&self) -> Vec<ServiceRecord> {
        self.state.read().await.services.clone()
    }

    pub async fn containers(&self) -> Vec<ContainerSummary> {
        self.state.read().await.containers.clone()
    }
}

#[async_trait]
impl Orchestrator for MemoryCluster {
    async fn list_services(&self) -> Result<Vec<ServiceRecord>, DeployerError> {
        Ok(self.state.read().await.services.clone())
    }

    async fn inspect_service(&self, id: &str) -> Result<ServiceRecord, DeployerError> {
        let state = self.state.read().await;
        state
            .find_service(id)
            .map(|i| state.services[i].clone())
            .ok_or_else(|| not_found("service", id))
    }

    async fn create_service(&self, spec: &ServiceSpec) -> Result<String, DeployerError> {
        let mut state = self.state.write().await;
        if state.services.iter().any(|s| s.spec.name == spec.name) {
            return Err(DeployerError::Docker {
                status: 409,
                message: format!("name conflicts with an existing object: {}", spec.name),
            });
        }

        let id = state.next_id("svc");
        state.mutations += 1;
        state.services.push(ServiceRecord {
            id: id.clone(),
            version: ObjectVersion { index: 1 },
            spec: spec.clone(),
            ..Default::default()
        });
        Ok(id)
    }

    async fn update_service(
        &self,
        id: &str,
        version: ObjectVersion,
        spec: &ServiceSpec,
    ) -> Result<(), DeployerError> {
        let mut state = self.state.write().await;
        let index = state.find_service(id).ok_or_else(|| not_found("service", id))?;
        state.mutations += 1;

        let service = &mut state.services[index];
        if service.version != version {
            return Err(DeployerError::Docker {
                status: 500,
                message: format!(
                    "update out of sequence: have {}, got {}",
                    service.version.index, version.index
                ),
            });
        }
        service.version.index += 1;
        service.spec = spec.clone();
        Ok(())
    }

    async fn remove_service(&self, id: &str) -> Result<(), DeployerError> {
        let mut state = self.state.write().await;
        if let Some((status, message)) = state.removal_failures.remove(id) {
            return Err(DeployerError::Docker { status, message });
        }

        let index = state.find_service(id).ok_or_else(|| not_found("service", id))?;
        state.mutations += 1;
        state.services.remove(index);
        Ok(())
    }

    async fn service_logs(
        &self,
        id: &str,
        _options: LogOptions,
    ) -> Result<LogStream, DeployerError> {
        let state = self.state.read().await;
        let index = state.find_service(id).ok_or_else(|| not_found("service", id))?;
        let chunks = state
            .logs
            .get(&state.services[index].id)
            .cloned()
            .unwrap_or_default();
        Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
    }

    async fn list_networks(&self) -> Result<Vec<Network>, DeployerError> {
        Ok(self.state.read().await.networks.clone())
    }

    async fn create_network(&self, request: &NetworkCreate) -> Result<String, DeployerError> {
        let mut state = self.state.write().await;
        if state.networks.iter().any(|n| n.name == request.name) {
            return Err(DeployerError::Docker {
                status: 409,
                message: format!("network with name {} already exists", request.name),
            });
        }

        let id = state.next_id("net");
        state.mutations += 1;
        state.networks.push(Network {
            id: id.clone(),
            name: request.name.clone(),
            driver: Some(request.driver.clone()),
            scope: Some("swarm".to_string()),
        });
        Ok(id)
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, DeployerError> {
        Ok(self.state.read().await.containers.clone())
    }

    async fn remove_container(&self, id: &str) -> Result<(), DeployerError> {
        let mut state = self.state.write().await;
        let index = state
            .containers
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| not_found("container", id))?;
        state.mutations += 1;
        state.containers.remove(index);
        Ok(())
    }
}
