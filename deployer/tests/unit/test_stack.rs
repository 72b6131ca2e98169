//! Stack deployment tests

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use swarm_api::{ServiceRecord, ServiceSpec};
use swarm_deployer::cluster::memory::MemoryCluster;
use swarm_deployer::compose::{StackDefinition, COMPOSE_FILE};
use swarm_deployer::config::{StackWaitOptions, SwarmConfig};
use swarm_deployer::deploy::command::ScriptedRunner;
use swarm_deployer::deploy::events::{drain, EventLevel, EventSink, StatusEvent};
use swarm_deployer::deploy::stack::StackRequest;
use swarm_deployer::deploy::Deployer;
use swarm_deployer::errors::DeployerError;
use swarm_deployer::filesys::file::File;
use swarm_deployer::labels::{self, STACK_NAME};
use tempfile::TempDir;
use tokio_test::assert_ok;

const BASE_NAME: &str = "exo-admin-app";

const STACK: &str = r#"
version: '3'
services:
  web:
    build: .
    labels:
      traefik.frontend.rule: Host:test.dev
      exoframe.name: exo-admin-app-web
    networks:
      - exoframe
  redis:
    image: redis:alpine
    networks:
      - exoframe
networks:
  exoframe:
    external: true
"#;

fn config(timeout: Duration) -> SwarmConfig {
    SwarmConfig {
        stack_wait: StackWaitOptions {
            poll_interval: Duration::from_millis(10),
            timeout,
        },
        ..Default::default()
    }
}

struct Fixture {
    dir: TempDir,
    cluster: Arc<MemoryCluster>,
    runner: Arc<ScriptedRunner>,
    deployer: Arc<Deployer>,
}

async fn fixture(compose: &str, runner: ScriptedRunner, timeout: Duration) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    File::new(dir.path().join(COMPOSE_FILE))
        .write_string(compose)
        .await
        .unwrap();

    let cluster = Arc::new(MemoryCluster::new());
    let runner = Arc::new(runner);
    let deployer = Arc::new(Deployer::new(cluster.clone(), runner.clone(), config(timeout)));
    Fixture {
        dir,
        cluster,
        runner,
        deployer,
    }
}

fn stack_request(dir: &Path) -> StackRequest {
    StackRequest::new(dir, BASE_NAME, vec!["exo-admin-app_web:latest".to_string()])
}

/// Mimic the cluster starting the stack's services a little later
fn start_services_later(cluster: Arc<MemoryCluster>) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut web = ServiceSpec {
            name: "exo-admin-app_web".to_string(),
            ..Default::default()
        };
        web.labels.insert(STACK_NAME.to_string(), "exo-admin-app-web".to_string());
        web.labels.insert(labels::PROJECT.to_string(), BASE_NAME.to_string());
        cluster.with_service(web).await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        cluster
            .with_service(ServiceSpec {
                name: "exo-admin-app_redis".to_string(),
                ..Default::default()
            })
            .await;
    });
}

async fn deploy(
    fixture: &Fixture,
) -> (Result<Vec<ServiceRecord>, DeployerError>, Vec<StatusEvent>) {
    let (sink, rx) = EventSink::channel();
    let result = fixture
        .deployer
        .deploy_stack(stack_request(fixture.dir.path()), sink)
        .await;
    (result, drain(rx).await)
}

#[tokio::test]
async fn test_stack_deploy_waits_for_all_services() {
    let fixture = fixture(
        STACK,
        ScriptedRunner::new(
            &[
                "Creating service exo-admin-app_web",
                "Creating service exo-admin-app_redis",
            ],
            0,
        ),
        Duration::from_secs(5),
    )
    .await;
    start_services_later(fixture.cluster.clone());

    let (result, events) = deploy(&fixture).await;
    let deployments = assert_ok!(result);

    let names: Vec<&str> = deployments.iter().map(|d| d.name()).collect();
    assert_eq!(names, vec!["exo-admin-app_web", "exo-admin-app_redis"]);

    let messages: Vec<&str> = events.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "Compose file modified for stack deploy",
            "Creating service exo-admin-app_web",
            "Creating service exo-admin-app_redis",
            "Docker stack deploy exited with code 0",
            "Deployment success!",
        ]
    );
    assert_eq!(events[0].level, EventLevel::Verbose);
    assert_eq!(events[1].level, EventLevel::Info);
    assert_eq!(events.last().unwrap().deployments.as_ref().unwrap().len(), 2);
}

#[tokio::test]
async fn test_stack_command_invocation() {
    let fixture = fixture(STACK, ScriptedRunner::new(&[], 0), Duration::from_secs(5)).await;
    start_services_later(fixture.cluster.clone());

    let (result, _) = deploy(&fixture).await;
    assert_ok!(result);

    let invocations = fixture.runner.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].program, "docker");
    assert_eq!(
        invocations[0].args,
        vec!["stack", "deploy", "-c", "docker-compose.yml", BASE_NAME]
    );
    assert_eq!(invocations[0].cwd, fixture.dir.path());
}

#[tokio::test]
async fn test_definition_rewritten_on_disk() {
    let fixture = fixture(STACK, ScriptedRunner::new(&[], 0), Duration::from_secs(5)).await;
    start_services_later(fixture.cluster.clone());

    let (result, _) = deploy(&fixture).await;
    assert_ok!(result);

    let file = File::new(fixture.dir.path().join(COMPOSE_FILE));
    let written = StackDefinition::load(&file).await.unwrap();
    let web = written.service("web").unwrap();
    assert!(!web.contains_key("build"));
    assert!(!web.contains_key("labels"));
    assert_eq!(web["image"], "exo-admin-app_web:latest");
    assert_eq!(
        written.deploy_label("web", labels::TRAEFIK_NETWORK).as_deref(),
        Some("exoframe-swarm")
    );
    assert!(!written.networks().unwrap().contains_key("exoframe"));
}

#[tokio::test]
async fn test_version_two_rejected_without_side_effects() {
    let compose = STACK.replace("version: '3'", "version: '2'");
    let fixture = fixture(&compose, ScriptedRunner::new(&[], 0), Duration::from_secs(5)).await;

    let (result, events) = deploy(&fixture).await;
    assert!(matches!(result, Err(DeployerError::ComposeVersion { .. })));

    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].message,
        "Running in swarm mode, can only deploy docker-compose file of version 3!"
    );
    assert_eq!(events[0].level, EventLevel::Error);
    assert_eq!(events[0].data.as_ref().unwrap()["version"], "2");

    assert!(fixture.runner.invocations().is_empty());
    assert_eq!(fixture.cluster.mutations().await, 0);
    let on_disk = File::new(fixture.dir.path().join(COMPOSE_FILE)).read_string().await.unwrap();
    assert_eq!(on_disk, compose);
}

#[tokio::test]
async fn test_missing_image_stops_before_command() {
    let fixture = fixture(STACK, ScriptedRunner::new(&[], 0), Duration::from_secs(5)).await;

    let (sink, rx) = EventSink::channel();
    let images = vec!["unrelated:latest".to_string()];
    let request = StackRequest::new(fixture.dir.path(), BASE_NAME, images);
    let result = fixture.deployer.deploy_stack(request, sink).await;
    let events = drain(rx).await;

    assert!(matches!(result, Err(DeployerError::MissingImage { .. })));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level, EventLevel::Error);
    assert!(fixture.runner.invocations().is_empty());

    let on_disk = File::new(fixture.dir.path().join(COMPOSE_FILE)).read_string().await.unwrap();
    assert_eq!(on_disk, STACK);
}

#[tokio::test]
async fn test_failed_command_reports_exit_code() {
    let fixture = fixture(
        STACK,
        ScriptedRunner::new(&["failed to create service exo-admin-app_web"], 1),
        Duration::from_secs(5),
    )
    .await;

    let (result, events) = deploy(&fixture).await;
    assert!(matches!(result, Err(DeployerError::DeployCommandFailed { exit_code: 1 })));

    let line = events
        .iter()
        .find(|e| e.message.starts_with("failed to create"))
        .unwrap();
    assert_eq!(line.level, EventLevel::Error);

    let last = events.last().unwrap();
    assert_eq!(last.message, "Deployment failed!");
    assert_eq!(last.exit_code.as_deref(), Some("1"));
    assert!(last.deployments.is_none());
}

#[tokio::test]
async fn test_readiness_wait_times_out() {
    let fixture = fixture(STACK, ScriptedRunner::new(&[], 0), Duration::from_millis(100)).await;

    let (result, events) = deploy(&fixture).await;
    assert!(matches!(result, Err(DeployerError::Timeout(_))));
    assert_eq!(events.last().unwrap().level, EventLevel::Error);
}

#[tokio::test]
async fn test_readiness_wait_abandoned_when_client_leaves() {
    let fixture = fixture(STACK, ScriptedRunner::new(&[], 0), Duration::from_secs(30)).await;

    let (sink, rx) = EventSink::channel();
    drop(rx);
    let result = fixture
        .deployer
        .deploy_stack(stack_request(fixture.dir.path()), sink)
        .await;
    assert!(matches!(result, Err(DeployerError::Cancelled(_))));
}
