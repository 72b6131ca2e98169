//! Identity conventions
//!
//! The orchestrator's label storage is the only record of who owns a service
//! and which project it belongs to. A user, project and deployment name
//! together identify one service; user and project alone identify the set of
//! services deployed for that project.

use swarm_api::{Labels, ServiceRecord};

/// Owning user
pub const USER: &str = "exoframe.user";
/// Logical project grouping one or more services
pub const PROJECT: &str = "exoframe.project";
/// Deployment name of a single service
pub const DEPLOYMENT: &str = "exoframe.deployment";
/// Deployment name a stack service is expected to come up with
pub const STACK_NAME: &str = "exoframe.name";

pub const TRAEFIK_BACKEND: &str = "traefik.backend";
pub const TRAEFIK_NETWORK: &str = "traefik.docker.network";
pub const TRAEFIK_ENABLE: &str = "traefik.enable";
pub const TRAEFIK_PORT: &str = "traefik.port";

/// Name prefix of the platform's own control service
pub const PLATFORM_SERVICE: &str = "exoframe-server";

/// Who and what a deployment belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentIdentity {
    pub user: String,
    pub project: String,
    pub deployment: String,
}

impl DeploymentIdentity {
    pub fn new(
        user: impl Into<String>,
        project: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            project: project.into(),
            deployment: deployment.into(),
        }
    }

    /// Identity and routing labels for a service of this deployment
    pub fn labels(&self, backend_host: &str, network: &str) -> Labels {
        let mut labels = Labels::new();
        labels.insert(USER.to_string(), self.user.clone());
        labels.insert(PROJECT.to_string(), self.project.clone());
        labels.insert(DEPLOYMENT.to_string(), self.deployment.clone());
        labels.insert(TRAEFIK_BACKEND.to_string(), backend_host.to_string());
        labels.insert(TRAEFIK_NETWORK.to_string(), network.to_string());
        labels.insert(TRAEFIK_ENABLE.to_string(), "true".to_string());
        labels
    }
}

/// Routing labels that bind a swarm service to the shared network
pub fn swarm_routing_labels(network: &str) -> Labels {
    let mut labels = Labels::new();
    labels.insert(TRAEFIK_PORT.to_string(), "80".to_string());
    labels.insert(TRAEFIK_NETWORK.to_string(), network.to_string());
    labels
}

/// Whether the service is labelled for `user`
pub fn is_owned_by(service: &ServiceRecord, user: &str) -> bool {
    service.label(USER) == Some(user)
}

/// Whether the service belongs to `project` of `user`
pub fn belongs_to_project(service: &ServiceRecord, user: &str, project: &str) -> bool {
    is_owned_by(service, user) && service.label(PROJECT) == Some(project)
}

/// Name the stack command gives to a service
pub fn stack_service_name(base_name: &str, service_key: &str) -> String {
    format!("{}_{}", base_name, service_key)
}
