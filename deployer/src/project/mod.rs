//! Project queries
//!
//! An identifier names either one service (by exact name) or every service of
//! a project. Log retrieval and removal resolve identifiers the same way.

pub mod list;
pub mod logs;
pub mod remove;

use swarm_api::ServiceRecord;

use crate::cluster::Orchestrator;
use crate::errors::DeployerError;
use crate::labels::{belongs_to_project, is_owned_by};

/// What an identifier resolved to
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Exact service name match
    Service(ServiceRecord),
    /// Every service labelled with the project, in cluster order
    Project(Vec<ServiceRecord>),
}

impl Resolution {
    pub fn into_services(self) -> Vec<ServiceRecord> {
        match self {
            Resolution::Service(service) => vec![service],
            Resolution::Project(services) => services,
        }
    }
}

/// Resolve `identifier` among the services of `user`
///
/// A service named `identifier` wins over project membership, even when
/// other services carry `identifier` as their project label.
pub async fn resolve(
    orchestrator: &dyn Orchestrator,
    identifier: &str,
    user: &str,
) -> Result<Resolution, DeployerError> {
    let services = orchestrator.list_services().await?;
    resolve_in(services, identifier, user)
}

fn resolve_in(
    services: Vec<ServiceRecord>,
    identifier: &str,
    user: &str,
) -> Result<Resolution, DeployerError> {
    if let Some(service) = services
        .iter()
        .find(|s| is_owned_by(s, user) && s.name() == identifier)
    {
        return Ok(Resolution::Service(service.clone()));
    }

    let project: Vec<ServiceRecord> = services
        .into_iter()
        .filter(|s| belongs_to_project(s, user, identifier))
        .collect();
    if project.is_empty() {
        return Err(DeployerError::NotFound(identifier.to_string()));
    }
    Ok(Resolution::Project(project))
}
