//! Cluster bootstrap
//!
//! Makes sure the shared overlay network and the routing proxy exist before
//! anything is deployed. Safe to run on every start.

use swarm_api::{
    ContainerSpec, ContainerSummary, EndpointSpec, Labels, Mount, NetworkAttachment,
    NetworkCreate, Placement, PortConfig, Resources, RestartPolicySpec, ServiceMode, ServiceSpec,
    TaskSpec, UpdateConfig,
};
use tracing::{debug, info, warn};

use crate::cluster::Orchestrator;
use crate::config::{ProxyConfig, SwarmConfig};
use crate::errors::DeployerError;
use crate::labels::{self, PLATFORM_SERVICE};

const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Prepare the cluster for deployments
///
/// Returns `false` without touching the cluster when swarm mode is disabled.
pub async fn ensure_cluster_ready(
    orchestrator: &dyn Orchestrator,
    config: &SwarmConfig,
) -> Result<bool, DeployerError> {
    if !config.enabled {
        debug!("Swarm mode disabled, skipping cluster bootstrap");
        return Ok(false);
    }

    let network = &config.network.swarm_network;
    ensure_network(orchestrator, network).await?;

    let containers = orchestrator.list_containers().await?;
    match find_proxy(&containers, &config.proxy.name) {
        Some(proxy) if !proxy.is_exited() => {
            info!("Routing proxy {} already running", config.proxy.name);
            join_network(orchestrator, &config.proxy.name, network).await;
            join_network(orchestrator, PLATFORM_SERVICE, network).await;
            return Ok(true);
        }
        Some(proxy) => {
            info!("Exited routing proxy found, re-creating");
            if let Err(e) = orchestrator.remove_container(&proxy.id).await {
                if !e.is_not_found() {
                    return Err(e);
                }
            }
        }
        None => {}
    }

    // containers are node-local; the service may already exist elsewhere
    let services = orchestrator.list_services().await?;
    if services.iter().any(|s| s.name() == config.proxy.name) {
        info!("Routing proxy service {} already exists", config.proxy.name);
        join_network(orchestrator, &config.proxy.name, network).await;
        join_network(orchestrator, PLATFORM_SERVICE, network).await;
        return Ok(true);
    }

    let spec = proxy_service_spec(&config.proxy, network);
    let id = orchestrator.create_service(&spec).await?;
    info!("Routing proxy {} started ({})", config.proxy.name, id);

    join_network(orchestrator, PLATFORM_SERVICE, network).await;
    Ok(true)
}

async fn ensure_network(orchestrator: &dyn Orchestrator, name: &str) -> Result<(), DeployerError> {
    let networks = orchestrator.list_networks().await?;
    if networks.iter().any(|n| n.name == name) {
        debug!("Network {} exists", name);
        return Ok(());
    }

    info!("Network {} does not exist, creating", name);
    orchestrator
        .create_network(&NetworkCreate {
            name: name.to_string(),
            driver: "overlay".to_string(),
            attachable: true,
        })
        .await?;
    Ok(())
}

fn find_proxy<'c>(containers: &'c [ContainerSummary], name: &str) -> Option<&'c ContainerSummary> {
    containers.iter().find(|c| {
        c.names
            .iter()
            .any(|n| n.trim_start_matches('/').starts_with(name))
    })
}

/// Arguments the proxy is started with
pub fn proxy_args(proxy: &ProxyConfig) -> Vec<String> {
    let compress = if proxy.compress { "Compress:on" } else { "Compress:off" };
    let mut args: Vec<String> = [
        "-c",
        "/dev/null",
        "--docker",
        "--docker.watch",
        "--docker.swarmmode",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if proxy.letsencrypt {
        args.extend([
            "--acme".to_string(),
            format!("--acme.email={}", proxy.letsencrypt_email),
            "--acme.storage=/var/acme/acme.json".to_string(),
            "--acme.httpchallenge.entrypoint=http".to_string(),
            "--acme.entrypoint=https".to_string(),
            "--acme.onhostrule=true".to_string(),
            "--accesslogsfile=/var/acme/access.log".to_string(),
            format!("--entryPoints=Name:https Address::443 TLS {}", compress),
            format!("--entryPoints=Name:http Address::80 Redirect.EntryPoint:https {}", compress),
            "--defaultEntryPoints=https,http".to_string(),
        ]);
    } else {
        args.extend([
            format!("--entryPoints=Name:http Address::80 {}", compress),
            "--defaultEntryPoints=http".to_string(),
        ]);
    }

    if proxy.debug {
        args.extend(["--debug".to_string(), "--logLevel=DEBUG".to_string()]);
    }
    args.extend(proxy.extra_args.iter().cloned());
    args
}

/// Single manager-pinned replica of the routing proxy
pub fn proxy_service_spec(proxy: &ProxyConfig, network: &str) -> ServiceSpec {
    let mut container_labels = Labels::new();
    container_labels.insert(labels::DEPLOYMENT.to_string(), proxy.name.clone());
    container_labels.insert(labels::USER.to_string(), "admin".to_string());

    ServiceSpec {
        name: proxy.name.clone(),
        task_template: TaskSpec {
            container_spec: Some(ContainerSpec {
                image: proxy.image.clone(),
                args: Some(proxy_args(proxy)),
                labels: Some(container_labels),
                mounts: Some(vec![Mount::bind(DOCKER_SOCKET, DOCKER_SOCKET)]),
                ..Default::default()
            }),
            resources: Some(Resources::default()),
            restart_policy: Some(RestartPolicySpec {
                condition: Some("on-failure".to_string()),
                max_attempts: Some(2),
            }),
            placement: Some(Placement {
                constraints: Some(vec!["node.role==manager".to_string()]),
            }),
            ..Default::default()
        },
        mode: Some(ServiceMode::replicated(1)),
        update_config: Some(UpdateConfig {
            parallelism: Some(1),
            ..Default::default()
        }),
        networks: Some(vec![NetworkAttachment::new(network)]),
        endpoint_spec: Some(EndpointSpec {
            ports: Some(vec![PortConfig::tcp(80), PortConfig::tcp(443)]),
        }),
        ..Default::default()
    }
}

fn attached(networks: &Option<Vec<NetworkAttachment>>, network: &str) -> bool {
    networks
        .as_ref()
        .map(|n| n.iter().any(|a| a.target == network))
        .unwrap_or(false)
}

/// Attach the service named `prefix*` to `network`
///
/// Failures are logged, not returned; a proxy or platform that cannot be
/// re-attached keeps serving on its current networks.
async fn join_network(orchestrator: &dyn Orchestrator, prefix: &str, network: &str) {
    if let Err(e) = try_join_network(orchestrator, prefix, network).await {
        warn!("Failed to attach {} to network {}: {}", prefix, network, e);
    }
}

async fn try_join_network(
    orchestrator: &dyn Orchestrator,
    prefix: &str,
    network: &str,
) -> Result<(), DeployerError> {
    let services = orchestrator.list_services().await?;
    let Some(found) = services.iter().find(|s| s.name().starts_with(prefix)) else {
        debug!("No {} service found, nothing to attach", prefix);
        return Ok(());
    };

    let record = orchestrator.inspect_service(&found.id).await?;
    if attached(&record.spec.networks, network)
        || attached(&record.spec.task_template.networks, network)
    {
        debug!("{} already attached to {}", record.name(), network);
        return Ok(());
    }

    let mut spec = record.spec.clone();
    let attachment = NetworkAttachment::new(network);
    match spec.networks.as_mut() {
        Some(networks) => networks.push(attachment),
        None => spec
            .task_template
            .networks
            .get_or_insert_with(Vec::new)
            .push(attachment),
    }

    info!("Attaching {} to network {}", record.name(), network);
    orchestrator.update_service(&record.id, record.version, &spec).await
}
