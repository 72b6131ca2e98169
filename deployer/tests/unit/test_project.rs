//! Project query, log and removal tests

use std::sync::Arc;

use futures::StreamExt;
use swarm_api::ServiceSpec;
use swarm_deployer::cluster::memory::MemoryCluster;
use swarm_deployer::cluster::LogStream;
use swarm_deployer::config::SwarmConfig;
use swarm_deployer::deploy::command::ScriptedRunner;
use swarm_deployer::deploy::Deployer;
use swarm_deployer::errors::DeployerError;
use swarm_deployer::labels::{PROJECT, USER};
use swarm_deployer::project::Resolution;
use tokio_test::{assert_err, assert_ok};

fn spec(name: &str, user: &str, project: &str) -> ServiceSpec {
    let mut spec = ServiceSpec {
        name: name.to_string(),
        ..Default::default()
    };
    spec.labels.insert(USER.to_string(), user.to_string());
    spec.labels.insert(PROJECT.to_string(), project.to_string());
    spec
}

fn deployer(cluster: Arc<MemoryCluster>) -> Deployer {
    Deployer::new(
        cluster,
        Arc::new(ScriptedRunner::new(&[], 0)),
        SwarmConfig::default(),
    )
}

async fn collect(stream: LogStream) -> String {
    let chunks: Vec<_> = stream.collect().await;
    chunks
        .into_iter()
        .map(|chunk| String::from_utf8(chunk.unwrap().to_vec()).unwrap())
        .collect()
}

/// Two-service stack plus an unrelated service of another user
async fn seeded() -> Arc<MemoryCluster> {
    let cluster = Arc::new(MemoryCluster::new());
    let web = cluster.with_service(spec("app_web", "admin", "app")).await;
    let redis = cluster.with_service(spec("app_redis", "admin", "app")).await;
    cluster.with_service(spec("guest_app", "guest", "app")).await;

    cluster.set_logs(&web, vec!["web line 1\n", "web line 2\n"]).await;
    cluster.set_logs(&redis, vec!["redis ready\n"]).await;
    cluster
}

#[tokio::test]
async fn test_exact_name_takes_precedence_over_project() {
    let cluster = seeded().await;
    // a service named like the project, sharing its label
    cluster.with_service(spec("app", "admin", "app")).await;
    let deployer = deployer(cluster);

    match assert_ok!(deployer.resolve("app", "admin").await) {
        Resolution::Service(service) => assert_eq!(service.name(), "app"),
        other => panic!("expected exact match, got {:?}", other),
    }
}

#[tokio::test]
async fn test_project_resolution_scoped_to_user() {
    let deployer = deployer(seeded().await);

    let resolution = assert_ok!(deployer.resolve("app", "admin").await);
    assert_eq!(resolution.into_services().len(), 2);

    let resolution = assert_ok!(deployer.resolve("app", "guest").await);
    assert_eq!(resolution.into_services().len(), 1);

    let err = assert_err!(deployer.resolve("app", "nobody").await);
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_project_logs_are_sectioned_per_service() {
    let deployer = deployer(seeded().await);

    let logs = collect(assert_ok!(deployer.logs("app", "admin", false).await)).await;
    assert_eq!(
        logs,
        "Logs for app_web\n\nweb line 1\nweb line 2\nLogs for app_redis\n\nredis ready\n"
    );
}

#[tokio::test]
async fn test_single_service_logs_are_raw() {
    let deployer = deployer(seeded().await);

    let logs = collect(assert_ok!(deployer.logs("app_redis", "admin", true).await)).await;
    assert_eq!(logs, "redis ready\n");
}

#[tokio::test]
async fn test_logs_of_unknown_identifier_not_found() {
    let deployer = deployer(seeded().await);
    let Err(err) = deployer.logs("shop", "admin", false).await else {
        panic!("expected logs of an unknown identifier to fail");
    };
    assert!(matches!(err, DeployerError::NotFound(_)));
}

#[tokio::test]
async fn test_platform_logs_without_platform_service() {
    let deployer = deployer(seeded().await);

    let logs = collect(assert_ok!(deployer.logs("exoframe-server", "anyone", false).await)).await;
    assert!(logs.ends_with(" Exoframe server not running in container!\n"));
    assert_eq!(logs.lines().count(), 1);
}

#[tokio::test]
async fn test_platform_logs_bypass_user_scope() {
    let cluster = seeded().await;
    let id = cluster
        .with_service(ServiceSpec {
            name: "exoframe-server".to_string(),
            ..Default::default()
        })
        .await;
    cluster.set_logs(&id, vec!["server started\n"]).await;
    let deployer = deployer(cluster);

    let logs = collect(assert_ok!(deployer.logs("exoframe-server", "guest", false).await)).await;
    assert_eq!(logs, "server started\n");
}

#[tokio::test]
async fn test_remove_project() {
    let cluster = seeded().await;
    let deployer = deployer(cluster.clone());

    assert_eq!(assert_ok!(deployer.remove("app", "admin").await), 2);

    let remaining: Vec<String> = cluster
        .services()
        .await
        .iter()
        .map(|s| s.name().to_string())
        .collect();
    assert_eq!(remaining, vec!["guest_app"]);
}

#[tokio::test]
async fn test_remove_unknown_not_found() {
    let cluster = seeded().await;
    let deployer = deployer(cluster.clone());

    let err = assert_err!(deployer.remove("shop", "admin").await);
    assert!(err.is_not_found());
    assert_eq!(cluster.mutations().await, 0);
}

#[tokio::test]
async fn test_remove_tolerates_vanished_service() {
    let cluster = seeded().await;
    let web = cluster
        .services()
        .await
        .into_iter()
        .find(|s| s.name() == "app_web")
        .unwrap();
    cluster.inject_removal_failure(&web.id, 404, "service app_web not found").await;
    let deployer = deployer(cluster.clone());

    assert_eq!(assert_ok!(deployer.remove("app", "admin").await), 2);
}

#[tokio::test]
async fn test_remove_continues_after_failure() {
    let cluster = seeded().await;
    let web = cluster
        .services()
        .await
        .into_iter()
        .find(|s| s.name() == "app_web")
        .unwrap();
    cluster.inject_removal_failure(&web.id, 500, "rpc error").await;
    let deployer = deployer(cluster.clone());

    match assert_err!(deployer.remove("app", "admin").await) {
        DeployerError::RemovalFailed { removed, failures } => {
            assert_eq!(removed, 1);
            assert_eq!(failures.len(), 1);
            assert!(failures[0].starts_with("app_web"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    // redis went even though web failed
    assert!(cluster.services().await.iter().all(|s| s.name() != "app_redis"));
}

#[tokio::test]
async fn test_list_excludes_proxy_and_other_users() {
    let cluster = seeded().await;
    cluster.with_service(spec("exo-traefik", "admin", "")).await;
    let deployer = deployer(cluster);

    let services = assert_ok!(deployer.list("admin").await);
    let names: Vec<&str> = services.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["app_web", "app_redis"]);
}
