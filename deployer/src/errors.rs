//! Error types for the swarm deployer

use thiserror::Error;

/// Main error type for the swarm deployer
#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Docker API error ({status}): {message}")]
    Docker { status: u16, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Running in swarm mode, can only deploy docker-compose file of version 3!")]
    ComposeVersion { definition: serde_json::Value },

    #[error("Invalid compose definition: {0}")]
    InvalidDefinition(String),

    #[error("No built image found for service {service} (tried {candidates:?})")]
    MissingImage {
        service: String,
        candidates: Vec<String>,
    },

    #[error("Deployment failed!")]
    DeployCommandFailed { exit_code: i32 },

    #[error("Invalid restart policy: {0}")]
    InvalidRestartPolicy(String),

    #[error("Service not found!")]
    NotFound(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Failed to remove {} service(s): {}", failures.len(), failures.join("; "))]
    RemovalFailed { removed: usize, failures: Vec<String> },

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployerError {
    /// Whether the error means the target does not exist, either because a
    /// lookup came back empty or because the engine answered 404
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DeployerError::NotFound(_) | DeployerError::Docker { status: 404, .. }
        )
    }
}
