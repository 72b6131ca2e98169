//! Multi-service stack deployment

use std::path::PathBuf;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use swarm_api::ServiceRecord;
use tracing::{debug, error, info};

use crate::cluster::Orchestrator;
use crate::compose::transform::transform_for_stack;
use crate::compose::{StackDefinition, COMPOSE_FILE};
use crate::config::SwarmConfig;
use crate::deploy::command::{CommandOutput, CommandRunner};
use crate::deploy::events::{EventLevel, EventSink, StatusEvent};
use crate::deploy::wait::wait_until;
use crate::errors::DeployerError;
use crate::filesys::dir::Dir;
use crate::labels::{stack_service_name, STACK_NAME};

fn default_compose_file() -> String {
    COMPOSE_FILE.to_string()
}

/// A stack deploy of one extracted project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackRequest {
    /// Working directory holding the definition
    pub project_dir: PathBuf,
    /// Stack name; services come up as `<base_name>_<key>`
    pub base_name: String,
    /// Images already built for the project
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default = "default_compose_file")]
    pub compose_file: String,
}

impl StackRequest {
    pub fn new(
        project_dir: impl Into<PathBuf>,
        base_name: impl Into<String>,
        images: Vec<String>,
    ) -> Self {
        Self {
            project_dir: project_dir.into(),
            base_name: base_name.into(),
            images,
            compose_file: default_compose_file(),
        }
    }
}

/// How a stack service is recognised once the cluster has started it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedService {
    /// Service carrying this `exoframe.name` label
    Labelled(String),
    /// Service with this name
    Named(String),
}

impl ExpectedService {
    fn find<'s>(&self, services: &'s [ServiceRecord]) -> Option<&'s ServiceRecord> {
        services.iter().find(|s| match self {
            ExpectedService::Labelled(name) => s.label(STACK_NAME) == Some(name.as_str()),
            ExpectedService::Named(name) => s.name() == name,
        })
    }
}

/// Services a deployed definition is expected to produce, in declaration order
pub fn expected_services(definition: &StackDefinition, base_name: &str) -> Vec<ExpectedService> {
    definition
        .service_keys()
        .into_iter()
        .map(|key| match definition.deploy_label(&key, STACK_NAME) {
            Some(name) => ExpectedService::Labelled(name),
            None => ExpectedService::Named(stack_service_name(base_name, &key)),
        })
        .collect()
}

fn line_level(line: &str) -> EventLevel {
    let lower = line.to_lowercase();
    if lower.contains("error") || lower.contains("failed") {
        EventLevel::Error
    } else {
        EventLevel::Info
    }
}

/// Drives `docker stack deploy` and waits for the stack to come up
pub struct StackDeployer<'a> {
    orchestrator: &'a dyn Orchestrator,
    runner: &'a dyn CommandRunner,
    config: &'a SwarmConfig,
}

impl<'a> StackDeployer<'a> {
    pub fn new(
        orchestrator: &'a dyn Orchestrator,
        runner: &'a dyn CommandRunner,
        config: &'a SwarmConfig,
    ) -> Self {
        Self {
            orchestrator,
            runner,
            config,
        }
    }

    /// Deploy the stack described by `request`, returning its inspected services
    pub async fn deploy(
        &self,
        request: &StackRequest,
        sink: &EventSink,
    ) -> Result<Vec<ServiceRecord>, DeployerError> {
        let project = Dir::new(&request.project_dir);
        project.require().await?;
        let file = project.file(&request.compose_file);

        let definition = StackDefinition::load(&file).await?;
        if let Err(e) = definition.ensure_swarm_compatible() {
            debug!("Rejecting definition with version {:?}", definition.version());
            return Err(e);
        }

        let stack = transform_for_stack(
            &definition,
            &request.base_name,
            &request.images,
            &self.config.network,
        )?;
        stack.save(&file).await?;
        debug!("Definition rewritten for stack {}", request.base_name);
        sink.emit(
            StatusEvent::verbose("Compose file modified for stack deploy")
                .with_data(stack.to_json()),
        );

        let exit_code = self.run_stack_command(request, sink).await?;
        if exit_code != 0 {
            error!("Stack deploy of {} exited with {}", request.base_name, exit_code);
            return Err(DeployerError::DeployCommandFailed { exit_code });
        }

        // the file on disk is what the stack command used
        let deployed = StackDefinition::load(&file).await?;
        let expected = expected_services(&deployed, &request.base_name);
        info!("Waiting for {} service(s) of stack {}", expected.len(), request.base_name);

        let orchestrator = self.orchestrator;
        let expected = &expected;
        let ids = wait_until(
            &format!("stack {}", request.base_name),
            self.config.stack_wait,
            || sink.is_closed(),
            move || async move {
                let services = orchestrator.list_services().await?;
                let found: Option<Vec<String>> = expected
                    .iter()
                    .map(|e| e.find(&services).map(|s| s.id.clone()))
                    .collect();
                Ok(found)
            },
        )
        .await?;

        try_join_all(ids.iter().map(|id| self.orchestrator.inspect_service(id))).await
    }

    async fn run_stack_command(
        &self,
        request: &StackRequest,
        sink: &EventSink,
    ) -> Result<i32, DeployerError> {
        let args = vec![
            "stack".to_string(),
            "deploy".to_string(),
            "-c".to_string(),
            request.compose_file.clone(),
            request.base_name.clone(),
        ];
        let mut output = self
            .runner
            .spawn(&self.config.docker_binary, &args, &request.project_dir)
            .await?;

        let mut exit_code = None;
        while let Some(item) = output.recv().await {
            match item {
                CommandOutput::Line(line) => {
                    let line = line.trim_end().to_string();
                    if !line.is_empty() {
                        sink.emit(StatusEvent::new(line_level(&line), line));
                    }
                }
                CommandOutput::Exited(code) => exit_code = Some(code),
            }
        }

        let code = exit_code.ok_or_else(|| {
            DeployerError::Internal("stack command ended without an exit status".to_string())
        })?;
        sink.emit(StatusEvent::info(format!(
            "Docker stack deploy exited with code {}",
            code
        )));
        Ok(code)
    }
}
