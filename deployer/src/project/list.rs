//! Service listing

use futures::future::try_join_all;
use swarm_api::ServiceRecord;

use crate::cluster::Orchestrator;
use crate::config::SwarmConfig;
use crate::errors::DeployerError;
use crate::labels::is_owned_by;

/// Inspected services of `user`, leaving out the routing proxy
pub async fn list_services(
    orchestrator: &dyn Orchestrator,
    config: &SwarmConfig,
    user: &str,
) -> Result<Vec<ServiceRecord>, DeployerError> {
    let services = orchestrator.list_services().await?;
    let owned = services
        .iter()
        .filter(|s| is_owned_by(s, user))
        .filter(|s| s.name() != config.proxy.name);

    try_join_all(owned.map(|s| orchestrator.inspect_service(&s.id))).await
}
