//! Single-service reconciliation tests

use std::sync::Arc;

use swarm_deployer::cluster::memory::MemoryCluster;
use swarm_deployer::cluster::Orchestrator;
use swarm_deployer::config::SwarmConfig;
use swarm_deployer::deploy::command::ScriptedRunner;
use swarm_deployer::deploy::events::{drain, EventLevel, EventSink};
use swarm_deployer::deploy::service::ServiceRequest;
use swarm_deployer::deploy::Deployer;
use swarm_deployer::errors::DeployerError;
use swarm_deployer::labels;
use tokio_test::{assert_err, assert_ok};

fn deployer(cluster: Arc<MemoryCluster>) -> Deployer {
    Deployer::new(
        cluster,
        Arc::new(ScriptedRunner::new(&[], 0)),
        SwarmConfig::default(),
    )
}

fn request(name: &str, image: &str) -> ServiceRequest {
    ServiceRequest {
        name: name.to_string(),
        image: image.to_string(),
        user: "admin".to_string(),
        project: "blog".to_string(),
        env: vec!["NODE_ENV=production".to_string()],
        hostname: Some("blog".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_first_deploy_creates_service() {
    let cluster = Arc::new(MemoryCluster::new());
    let deployer = deployer(cluster.clone());

    let (sink, rx) = EventSink::channel();
    let record = assert_ok!(
        deployer
            .deploy_service(request("exo-admin-blog-1", "exo-admin-blog:latest"), sink)
            .await
    );
    let events = drain(rx).await;

    let messages: Vec<&str> = events.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "Starting service with following config:",
            "Service successfully started!",
            "Deployment success!",
        ]
    );
    assert_eq!(events[0].level, EventLevel::Verbose);

    let last = events.last().unwrap();
    assert_eq!(last.level, EventLevel::Info);
    let deployments = last.deployments.as_ref().unwrap();
    assert_eq!(deployments.len(), 1);
    assert_eq!(deployments[0].id, record.id);

    assert_eq!(record.name(), "exo-admin-blog-1");
    assert_eq!(record.label(labels::USER), Some("admin"));
    assert_eq!(record.label(labels::PROJECT), Some("blog"));
    assert_eq!(cluster.mutations().await, 1);
}

#[tokio::test]
async fn test_redeploy_same_image_updates_in_place() {
    let cluster = Arc::new(MemoryCluster::new());
    let deployer = deployer(cluster.clone());

    let (sink, _rx) = EventSink::channel();
    let first = assert_ok!(
        deployer
            .deploy_service(request("exo-admin-blog-1", "exo-admin-blog:latest"), sink)
            .await
    );

    let (sink, rx) = EventSink::channel();
    let second = assert_ok!(
        deployer
            .deploy_service(request("exo-admin-blog-2", "exo-admin-blog:latest"), sink)
            .await
    );
    let events = drain(rx).await;

    assert_eq!(second.id, first.id);
    assert_eq!(second.name(), "exo-admin-blog-1");
    assert_eq!(second.version.index, first.version.index + 1);
    assert_eq!(second.spec.task_template.force_update, Some(1));
    assert_eq!(events[0].message, "Updating service with following config:");
    assert_eq!(events[1].message, "Service successfully updated!");
    assert_eq!(cluster.services().await.len(), 1);
}

#[tokio::test]
async fn test_force_update_counter_increments() {
    let cluster = Arc::new(MemoryCluster::new());
    let deployer = deployer(cluster.clone());

    for _ in 0..3 {
        let (sink, _rx) = EventSink::channel();
        assert_ok!(
            deployer
                .deploy_service(request("exo-admin-blog", "exo-admin-blog:latest"), sink)
                .await
        );
    }

    let record = assert_ok!(cluster.inspect_service("exo-admin-blog").await);
    assert_eq!(record.spec.task_template.force_update, Some(2));
}

#[tokio::test]
async fn test_different_image_creates_new_service() {
    let cluster = Arc::new(MemoryCluster::new());
    let deployer = deployer(cluster.clone());

    let (sink, _rx) = EventSink::channel();
    let first = assert_ok!(
        deployer
            .deploy_service(request("exo-admin-blog-1", "exo-admin-blog:v1"), sink)
            .await
    );

    let (sink, _rx) = EventSink::channel();
    let second = assert_ok!(
        deployer
            .deploy_service(request("exo-admin-blog-2", "exo-admin-blog:v2"), sink)
            .await
    );

    assert_ne!(first.id, second.id);
    assert_eq!(second.spec.task_template.force_update, None);
    assert_eq!(cluster.services().await.len(), 2);
}

#[tokio::test]
async fn test_other_users_service_not_updated() {
    let cluster = Arc::new(MemoryCluster::new());
    let deployer = deployer(cluster.clone());

    let (sink, _rx) = EventSink::channel();
    let theirs = assert_ok!(
        deployer
            .deploy_service(
                ServiceRequest {
                    user: "guest".to_string(),
                    ..request("exo-guest-blog", "blog:latest")
                },
                sink
            )
            .await
    );

    let (sink, _rx) = EventSink::channel();
    let ours = assert_ok!(
        deployer
            .deploy_service(request("exo-admin-blog", "blog:latest"), sink)
            .await
    );
    assert_ne!(theirs.id, ours.id);
}

#[tokio::test]
async fn test_invalid_restart_policy_fails_before_mutation() {
    let cluster = Arc::new(MemoryCluster::new());
    let deployer = deployer(cluster.clone());

    let (sink, rx) = EventSink::channel();
    let result = deployer
        .deploy_service(
            ServiceRequest {
                restart: Some("sometimes".to_string()),
                ..request("exo-admin-blog", "blog:latest")
            },
            sink,
        )
        .await;
    assert!(matches!(result, Err(DeployerError::InvalidRestartPolicy(_))));

    let events = drain(rx).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level, EventLevel::Error);
    assert_eq!(cluster.mutations().await, 0);
}

#[tokio::test]
async fn test_restart_policy_submitted() {
    let cluster = Arc::new(MemoryCluster::new());
    let deployer = deployer(cluster.clone());

    let (sink, _rx) = EventSink::channel();
    let record = assert_ok!(
        deployer
            .deploy_service(
                ServiceRequest {
                    restart: Some("on-failure:5".to_string()),
                    ..request("exo-admin-blog", "blog:latest")
                },
                sink
            )
            .await
    );

    let restart = record.spec.task_template.restart_policy.unwrap();
    assert_eq!(restart.condition.as_deref(), Some("on-failure"));
    assert_eq!(restart.max_attempts, Some(5));
}

#[tokio::test]
async fn test_concurrent_deploys_of_one_project_do_not_duplicate() {
    let cluster = Arc::new(MemoryCluster::new());
    let deployer = Arc::new(deployer(cluster.clone()));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let deployer = deployer.clone();
            tokio::spawn(async move {
                let (sink, _rx) = EventSink::channel();
                deployer
                    .deploy_service(request(&format!("exo-admin-blog-{}", i), "blog:latest"), sink)
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }
    assert_eq!(cluster.services().await.len(), 1);
}

#[tokio::test]
async fn test_create_from_params_always_creates() {
    let cluster = Arc::new(MemoryCluster::new());
    let deployer = deployer(cluster.clone());

    let params = ServiceRequest {
        additional_networks: vec!["db-net".to_string()],
        ..request("exo-admin-blog-db", "postgres:16")
    };
    let record = assert_ok!(deployer.create_from_params(params.clone()).await);

    let networks = record.spec.networks.unwrap();
    assert_eq!(networks[0].target, "db-net");
    assert_eq!(networks[1].target, "exoframe-swarm");
    assert_eq!(networks[1].aliases, Some(vec!["blog".to_string()]));

    // same name again conflicts instead of updating
    let err = assert_err!(deployer.create_from_params(params).await);
    assert!(matches!(err, DeployerError::Docker { status: 409, .. }));
}
