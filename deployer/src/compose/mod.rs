//! Multi-service stack definitions
//!
//! Definitions are kept as a generic YAML mapping so keys this crate does not
//! understand survive a load, transform and save cycle untouched.

pub mod transform;

use serde_yaml::{Mapping, Value};

use crate::errors::DeployerError;
use crate::filesys::file::File;

/// Default definition file name inside a project directory
pub const COMPOSE_FILE: &str = "docker-compose.yml";

/// Major format version the cluster's stack command accepts
pub const SWARM_COMPOSE_MAJOR: &str = "3";

/// A parsed compose-style stack definition
#[derive(Debug, Clone, PartialEq)]
pub struct StackDefinition {
    root: Mapping,
}

impl StackDefinition {
    pub fn parse(text: &str) -> Result<Self, DeployerError> {
        match serde_yaml::from_str::<Value>(text)? {
            Value::Mapping(root) => Ok(Self { root }),
            Value::Null => Ok(Self { root: Mapping::new() }),
            _ => Err(DeployerError::InvalidDefinition(
                "definition must be a mapping".to_string(),
            )),
        }
    }

    pub fn to_yaml(&self) -> Result<String, DeployerError> {
        Ok(serde_yaml::to_string(&self.root)?)
    }

    /// JSON rendering, used as event payload
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.root).unwrap_or(serde_json::Value::Null)
    }

    /// Declared format version; numbers are read as their decimal text
    pub fn version(&self) -> Option<String> {
        match self.root.get("version")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Whether the definition can be handed to the stack command
    pub fn is_swarm_compatible(&self) -> bool {
        self.version()
            .map(|v| v.trim().split('.').next() == Some(SWARM_COMPOSE_MAJOR))
            .unwrap_or(false)
    }

    /// Fail unless the definition declares a cluster-mode compatible version
    pub fn ensure_swarm_compatible(&self) -> Result<(), DeployerError> {
        if self.is_swarm_compatible() {
            Ok(())
        } else {
            Err(DeployerError::ComposeVersion {
                definition: self.to_json(),
            })
        }
    }

    /// Service keys in declaration order
    pub fn service_keys(&self) -> Vec<String> {
        self.services()
            .map(|services| {
                services
                    .keys()
                    .filter_map(|k| k.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn services(&self) -> Option<&Mapping> {
        self.root.get("services").and_then(Value::as_mapping)
    }

    pub fn service(&self, key: &str) -> Option<&Mapping> {
        self.services()?.get(key).and_then(Value::as_mapping)
    }

    pub fn networks(&self) -> Option<&Mapping> {
        self.root.get("networks").and_then(Value::as_mapping)
    }

    /// Value of a service's `deploy.labels` entry
    pub fn deploy_label(&self, service_key: &str, label: &str) -> Option<String> {
        let labels = self
            .service(service_key)?
            .get("deploy")?
            .as_mapping()?
            .get("labels")?;
        transform::label_map(labels)
            .remove(label)
            .and_then(|value| value.as_str().map(str::to_string))
    }

    pub(crate) fn root_mut(&mut self) -> &mut Mapping {
        &mut self.root
    }

    pub async fn load(file: &File) -> Result<Self, DeployerError> {
        Self::parse(&file.read_string().await?)
    }

    pub async fn save(&self, file: &File) -> Result<(), DeployerError> {
        file.write_string(&self.to_yaml()?).await
    }
}
