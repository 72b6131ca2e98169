//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info};

use crate::cluster::docker::DockerClient;
use crate::deploy::command::ProcessRunner;
use crate::deploy::Deployer;
use crate::errors::DeployerError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::storage::settings::Settings;

/// Run the swarm deployer until `shutdown_signal` resolves
pub async fn run(
    settings: Settings,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DeployerError> {
    info!("Initializing swarm deployer...");

    let host = settings.docker.resolved_host();
    let client = DockerClient::new(&host)?;
    info!("Using Docker engine at {}", client.base_url());

    let deployer = Arc::new(Deployer::new(
        Arc::new(client),
        Arc::new(ProcessRunner),
        settings.swarm_config(),
    ));

    match deployer.init().await {
        Ok(true) => info!("Cluster ready"),
        Ok(false) => info!("Swarm mode disabled, cluster left untouched"),
        Err(e) => {
            error!("Failed to prepare the cluster: {}", e);
            return Err(e);
        }
    }

    let state = Arc::new(ServerState::new(deployer));
    let handle = serve(&settings.server, state, shutdown_signal).await?;

    match handle.await {
        Ok(result) => {
            info!("HTTP server stopped");
            result
        }
        Err(e) => Err(DeployerError::Internal(format!("server task failed: {}", e))),
    }
}
