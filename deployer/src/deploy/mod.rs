//! Deployment engine
//!
//! [`Deployer`] is the entry point: it serialises operations per deployment,
//! reports through an [`EventSink`] and closes that sink when the operation
//! ends, whichever way it ends.

pub mod command;
pub mod events;
pub mod locks;
pub mod restart;
pub mod service;
pub mod stack;
pub mod wait;

use std::sync::Arc;

use swarm_api::ServiceRecord;
use tracing::{error, info};

use crate::bootstrap::ensure_cluster_ready;
use crate::cluster::{LogStream, Orchestrator};
use crate::config::SwarmConfig;
use crate::deploy::command::CommandRunner;
use crate::deploy::events::{EventSink, StatusEvent};
use crate::deploy::locks::DeploymentLocks;
use crate::deploy::service::{ServiceDeployer, ServiceRequest};
use crate::deploy::stack::{StackDeployer, StackRequest};
use crate::errors::DeployerError;
use crate::project::{self, list, logs, remove};

/// Swarm deployment engine
pub struct Deployer {
    orchestrator: Arc<dyn Orchestrator>,
    runner: Arc<dyn CommandRunner>,
    config: SwarmConfig,
    locks: DeploymentLocks,
}

impl Deployer {
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        runner: Arc<dyn CommandRunner>,
        config: SwarmConfig,
    ) -> Self {
        Self {
            orchestrator,
            runner,
            config,
            locks: DeploymentLocks::new(),
        }
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &dyn Orchestrator {
        self.orchestrator.as_ref()
    }

    /// Bootstrap the shared network and routing proxy
    pub async fn init(&self) -> Result<bool, DeployerError> {
        ensure_cluster_ready(self.orchestrator(), &self.config).await
    }

    /// Deploy one service, creating it or updating its running counterpart
    pub async fn deploy_service(
        &self,
        request: ServiceRequest,
        sink: EventSink,
    ) -> Result<ServiceRecord, DeployerError> {
        let _guard = self
            .locks
            .acquire(&format!("{}/{}", request.user, request.project))
            .await;

        let result = ServiceDeployer::new(self.orchestrator(), &self.config)
            .reconcile(&request, &sink)
            .await;
        finish(sink, result.map(|record| vec![record])).and_then(|mut records| {
            records
                .pop()
                .ok_or_else(|| DeployerError::Internal("no service deployed".to_string()))
        })
    }

    /// Deploy a multi-service stack from an extracted project directory
    pub async fn deploy_stack(
        &self,
        request: StackRequest,
        sink: EventSink,
    ) -> Result<Vec<ServiceRecord>, DeployerError> {
        let _guard = self.locks.acquire(&request.base_name).await;

        let result = StackDeployer::new(self.orchestrator(), self.runner.as_ref(), &self.config)
            .deploy(&request, &sink)
            .await;
        finish(sink, result)
    }

    /// Create a service without matching existing ones
    pub async fn create_from_params(
        &self,
        request: ServiceRequest,
    ) -> Result<ServiceRecord, DeployerError> {
        ServiceDeployer::new(self.orchestrator(), &self.config)
            .create_from_params(&request)
            .await
    }

    pub async fn list(&self, user: &str) -> Result<Vec<ServiceRecord>, DeployerError> {
        list::list_services(self.orchestrator(), &self.config, user).await
    }

    pub async fn resolve(
        &self,
        identifier: &str,
        user: &str,
    ) -> Result<project::Resolution, DeployerError> {
        project::resolve(self.orchestrator(), identifier, user).await
    }

    pub async fn logs(
        &self,
        identifier: &str,
        user: &str,
        follow: bool,
    ) -> Result<LogStream, DeployerError> {
        logs::fetch_logs(self.orchestrator(), identifier, user, follow).await
    }

    /// Remove the services `identifier` resolves to, returning how many went
    pub async fn remove(&self, identifier: &str, user: &str) -> Result<usize, DeployerError> {
        remove::remove(self.orchestrator(), identifier, user).await
    }
}

/// Emit the terminal event of an operation and close its stream
fn finish(
    sink: EventSink,
    result: Result<Vec<ServiceRecord>, DeployerError>,
) -> Result<Vec<ServiceRecord>, DeployerError> {
    match &result {
        Ok(deployments) => {
            info!("Deployment of {} service(s) succeeded", deployments.len());
            sink.emit(
                StatusEvent::info("Deployment success!").with_deployments(deployments.clone()),
            );
        }
        Err(e) => {
            error!("Deployment failed: {}", e);
            sink.emit(StatusEvent::from_error(e));
        }
    }
    drop(sink);
    result
}
