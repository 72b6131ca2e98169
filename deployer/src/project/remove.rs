//! Service removal

use futures::future::join_all;
use tracing::{info, warn};

use crate::cluster::Orchestrator;
use crate::errors::DeployerError;
use crate::project::resolve;

/// Remove every service `identifier` resolves to for `user`
///
/// Each removal runs independently. A service that is already gone counts
/// as removed; other failures are collected into
/// [`DeployerError::RemovalFailed`] after every removal has been attempted.
pub async fn remove(
    orchestrator: &dyn Orchestrator,
    identifier: &str,
    user: &str,
) -> Result<usize, DeployerError> {
    let services = resolve(orchestrator, identifier, user).await?.into_services();

    let results = join_all(services.iter().map(|service| async move {
        match orchestrator.remove_service(&service.id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                warn!("Service {} already removed", service.name());
                Ok(())
            }
            Err(e) => Err(format!("{}: {}", service.name(), e)),
        }
    }))
    .await;

    let failures: Vec<String> = results.into_iter().filter_map(Result::err).collect();
    let removed = services.len() - failures.len();
    if !failures.is_empty() {
        return Err(DeployerError::RemovalFailed { removed, failures });
    }

    info!("Removed {} service(s) for {}", removed, identifier);
    Ok(removed)
}
