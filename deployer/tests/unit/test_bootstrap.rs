//! Cluster bootstrap tests

use std::sync::Arc;

use swarm_api::{ContainerSummary, NetworkAttachment, ServiceSpec};
use swarm_deployer::bootstrap::ensure_cluster_ready;
use swarm_deployer::cluster::memory::MemoryCluster;
use swarm_deployer::cluster::Orchestrator;
use swarm_deployer::config::SwarmConfig;
use tokio_test::assert_ok;

fn proxy_container(status: &str) -> ContainerSummary {
    ContainerSummary {
        id: "c-traefik".to_string(),
        names: vec!["/exo-traefik.1.abc".to_string()],
        image: "traefik:1.7".to_string(),
        state: if status.starts_with("Exited") { "exited" } else { "running" }.to_string(),
        status: status.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_disabled_swarm_is_noop() {
    let cluster = MemoryCluster::new();
    let config = SwarmConfig {
        enabled: false,
        ..Default::default()
    };

    assert!(!assert_ok!(ensure_cluster_ready(&cluster, &config).await));
    assert!(assert_ok!(cluster.list_networks().await).is_empty());
    assert_eq!(cluster.mutations().await, 0);
}

#[tokio::test]
async fn test_fresh_cluster_gets_network_and_proxy() {
    let cluster = MemoryCluster::new();
    let config = SwarmConfig::default();

    assert!(assert_ok!(ensure_cluster_ready(&cluster, &config).await));

    let networks = assert_ok!(cluster.list_networks().await);
    assert_eq!(networks.len(), 1);
    assert_eq!(networks[0].name, "exoframe-swarm");
    assert_eq!(networks[0].driver.as_deref(), Some("overlay"));

    let proxy = assert_ok!(cluster.inspect_service("exo-traefik").await);
    assert_eq!(proxy.image(), Some("traefik:1.7"));
    assert_eq!(proxy.spec.networks.unwrap()[0].target, "exoframe-swarm");
}

#[tokio::test]
async fn test_bootstrap_idempotent() {
    let cluster = MemoryCluster::new();
    let config = SwarmConfig::default();
    cluster.add_network("exoframe-swarm").await;
    cluster.add_container(proxy_container("Up 2 hours")).await;

    assert!(assert_ok!(ensure_cluster_ready(&cluster, &config).await));
    assert!(assert_ok!(ensure_cluster_ready(&cluster, &config).await));

    assert_eq!(assert_ok!(cluster.list_networks().await).len(), 1);
    assert!(cluster.services().await.is_empty());
    assert_eq!(cluster.mutations().await, 0);
}

#[tokio::test]
async fn test_exited_proxy_recreated() {
    let cluster = MemoryCluster::new();
    let config = SwarmConfig::default();
    cluster.add_container(proxy_container("Exited (1) 3 minutes ago")).await;

    assert!(assert_ok!(ensure_cluster_ready(&cluster, &config).await));

    assert!(cluster.containers().await.is_empty());
    assert_ok!(cluster.inspect_service("exo-traefik").await);
}

#[tokio::test]
async fn test_running_proxy_service_joins_network() {
    let cluster = Arc::new(MemoryCluster::new());
    let config = SwarmConfig::default();
    cluster.add_container(proxy_container("Up 5 minutes")).await;
    cluster
        .with_service(ServiceSpec {
            name: "exo-traefik".to_string(),
            networks: Some(vec![NetworkAttachment::new("ingress")]),
            ..Default::default()
        })
        .await;

    assert!(assert_ok!(ensure_cluster_ready(cluster.as_ref(), &config).await));

    let proxy = assert_ok!(cluster.inspect_service("exo-traefik").await);
    let targets: Vec<String> = proxy
        .spec
        .networks
        .unwrap()
        .into_iter()
        .map(|n| n.target)
        .collect();
    assert_eq!(targets, vec!["ingress", "exoframe-swarm"]);
}

#[tokio::test]
async fn test_platform_service_joins_network_once() {
    let cluster = MemoryCluster::new();
    let config = SwarmConfig::default();
    cluster
        .with_service(ServiceSpec {
            name: "exoframe-server-1".to_string(),
            ..Default::default()
        })
        .await;

    assert_ok!(ensure_cluster_ready(&cluster, &config).await);
    let after_first = cluster.mutations().await;
    assert_ok!(ensure_cluster_ready(&cluster, &config).await);

    let server = assert_ok!(cluster.inspect_service("exoframe-server-1").await);
    let networks = server.spec.task_template.networks.unwrap();
    assert_eq!(networks.len(), 1);
    assert_eq!(networks[0].target, "exoframe-swarm");
    assert_eq!(cluster.mutations().await, after_first);
}
