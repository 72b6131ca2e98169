//! Single-service reconciliation

use serde::{Deserialize, Serialize};
use swarm_api::{
    ContainerSpec, Labels, Mount, NetworkAttachment, Placement, Resources, ServiceMode,
    ServiceRecord, ServiceSpec, TaskSpec, UpdateConfig,
};
use tracing::{debug, info};

use crate::cluster::Orchestrator;
use crate::config::SwarmConfig;
use crate::deploy::events::{EventSink, StatusEvent};
use crate::deploy::restart::RestartPolicy;
use crate::errors::DeployerError;
use crate::labels::{self, belongs_to_project, DeploymentIdentity};

/// Rolling update delay, in nanoseconds
pub const UPDATE_DELAY_NS: u64 = 10_000_000_000;
/// Instances allowed to run side by side during an update
pub const UPDATE_PARALLELISM: u64 = 2;

/// A single service to run on the cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceRequest {
    /// Deployment name, used as the service name on create
    pub name: String,
    pub image: String,
    pub user: String,
    pub project: String,
    /// `KEY=value` entries
    pub env: Vec<String>,
    pub mounts: Vec<Mount>,
    pub labels: Labels,
    /// Restart policy string; the configured default applies when unset
    pub restart: Option<String>,
    /// Alias on the shared network
    pub hostname: Option<String>,
    /// Networks attached ahead of the shared one
    pub additional_networks: Vec<String>,
    /// Routing backend name; the deployment name when unset
    pub backend: Option<String>,
}

impl ServiceRequest {
    fn service_labels(&self, network: &str) -> Labels {
        let deployment = self
            .labels
            .get(labels::DEPLOYMENT)
            .cloned()
            .unwrap_or_else(|| self.name.clone());
        let identity = DeploymentIdentity::new(&self.user, &self.project, deployment);
        let backend = self.backend.as_deref().unwrap_or(&self.name);

        let mut service_labels = identity.labels(backend, network);
        // ownership labels are never taken from the caller
        for (key, value) in &self.labels {
            if key != labels::USER && key != labels::PROJECT {
                service_labels.insert(key.clone(), value.clone());
            }
        }
        service_labels.extend(labels::swarm_routing_labels(network));
        service_labels
    }
}

/// Build the spec submitted for `request`
pub fn build_service_spec(
    request: &ServiceRequest,
    config: &SwarmConfig,
) -> Result<ServiceSpec, DeployerError> {
    let restart: RestartPolicy = request
        .restart
        .as_deref()
        .unwrap_or(&config.default_restart_policy)
        .parse()?;
    let network = &config.network.swarm_network;

    let mut networks: Vec<NetworkAttachment> = request
        .additional_networks
        .iter()
        .map(NetworkAttachment::new)
        .collect();
    networks.push(NetworkAttachment {
        target: network.clone(),
        aliases: Some(
            request
                .hostname
                .iter()
                .filter(|h| !h.is_empty())
                .cloned()
                .collect(),
        ),
    });

    Ok(ServiceSpec {
        name: request.name.clone(),
        labels: request.service_labels(network),
        task_template: TaskSpec {
            container_spec: Some(ContainerSpec {
                image: request.image.clone(),
                env: Some(request.env.clone()),
                mounts: (!request.mounts.is_empty()).then(|| request.mounts.clone()),
                ..Default::default()
            }),
            resources: Some(Resources::default()),
            restart_policy: Some(restart.into()),
            placement: Some(Placement::default()),
            ..Default::default()
        },
        mode: Some(ServiceMode::replicated(1)),
        update_config: Some(UpdateConfig {
            parallelism: Some(UPDATE_PARALLELISM),
            delay: Some(UPDATE_DELAY_NS),
            order: Some("start-first".to_string()),
        }),
        networks: Some(networks),
        ..Default::default()
    })
}

fn spec_json(spec: &ServiceSpec) -> serde_json::Value {
    serde_json::to_value(spec).unwrap_or(serde_json::Value::Null)
}

/// Creates or updates services on the cluster
pub struct ServiceDeployer<'a> {
    orchestrator: &'a dyn Orchestrator,
    config: &'a SwarmConfig,
}

impl<'a> ServiceDeployer<'a> {
    pub fn new(orchestrator: &'a dyn Orchestrator, config: &'a SwarmConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Service of the same user and project already running `image`
    async fn find_update_target(
        &self,
        request: &ServiceRequest,
    ) -> Result<Option<ServiceRecord>, DeployerError> {
        let services = self.orchestrator.list_services().await?;
        Ok(services.into_iter().find(|s| {
            belongs_to_project(s, &request.user, &request.project)
                && s.image() == Some(request.image.as_str())
        }))
    }

    /// Converge the cluster on `request`
    ///
    /// Only a service of the same user and project running the same image is
    /// updated; anything else is a create, so a second image under one
    /// project runs alongside the first.
    pub async fn reconcile(
        &self,
        request: &ServiceRequest,
        sink: &EventSink,
    ) -> Result<ServiceRecord, DeployerError> {
        let mut spec = build_service_spec(request, self.config)?;

        match self.find_update_target(request).await? {
            Some(existing) => {
                spec.name = existing.spec.name.clone();
                spec.task_template.force_update =
                    Some(existing.spec.task_template.force_update.unwrap_or(0) + 1);

                debug!("Updating service {} at version {}", existing.id, existing.version.index);
                sink.emit(
                    StatusEvent::verbose("Updating service with following config:")
                        .with_data(spec_json(&spec)),
                );
                self.orchestrator
                    .update_service(&existing.id, existing.version, &spec)
                    .await?;

                let record = self.orchestrator.inspect_service(&existing.id).await?;
                info!("Updated service {} ({})", record.name(), record.id);
                sink.emit(
                    StatusEvent::verbose("Service successfully updated!")
                        .with_data(serde_json::to_value(&record)?),
                );
                Ok(record)
            }
            None => {
                sink.emit(
                    StatusEvent::verbose("Starting service with following config:")
                        .with_data(spec_json(&spec)),
                );
                let record = self.create(&spec).await?;
                sink.emit(
                    StatusEvent::verbose("Service successfully started!")
                        .with_data(serde_json::to_value(&record)?),
                );
                Ok(record)
            }
        }
    }

    /// Create a service for `request` without looking for an existing one
    pub async fn create_from_params(
        &self,
        request: &ServiceRequest,
    ) -> Result<ServiceRecord, DeployerError> {
        let spec = build_service_spec(request, self.config)?;
        self.create(&spec).await
    }

    async fn create(&self, spec: &ServiceSpec) -> Result<ServiceRecord, DeployerError> {
        let id = self.orchestrator.create_service(spec).await?;
        let record = self.orchestrator.inspect_service(&id).await?;
        info!("Created service {} ({})", record.name(), record.id);
        Ok(record)
    }
}
