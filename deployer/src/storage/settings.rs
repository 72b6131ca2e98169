//! Settings file management

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cluster::docker::DEFAULT_SOCKET;
use crate::config::{NetworkConfig, ProxyConfig, StackWaitOptions, SwarmConfig};
use crate::logs::LogLevel;

/// Deployer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Also write daily log files under the storage layout's log directory
    #[serde(default)]
    pub log_to_file: bool,

    /// Docker engine configuration
    #[serde(default)]
    pub docker: DockerSettings,

    /// Name of the local (non-swarm) network stacks are written against
    #[serde(default = "default_exoframe_network")]
    pub exoframe_network: String,

    /// Swarm plugin configuration
    #[serde(default)]
    pub swarm: SwarmSettings,

    /// Routing proxy configuration
    #[serde(default)]
    pub traefik: TraefikSettings,

    /// Enable Let's Encrypt on the routing proxy
    #[serde(default)]
    pub letsencrypt: bool,

    /// Contact address for Let's Encrypt
    #[serde(default)]
    pub letsencrypt_email: String,

    /// Enable response compression on the proxy entrypoints
    #[serde(default = "default_true")]
    pub compress: bool,

    /// Run the proxy with debug logging
    #[serde(default)]
    pub debug: bool,

    /// Restart policy applied when a deploy request does not set one
    #[serde(default = "default_restart_policy")]
    pub default_restart_policy: String,

    /// Stack readiness wait
    #[serde(default)]
    pub stack: StackSettings,

    /// Local HTTP server
    #[serde(default)]
    pub server: ServerSettings,
}

fn default_true() -> bool {
    true
}

fn default_exoframe_network() -> String {
    "exoframe".to_string()
}

fn default_restart_policy() -> String {
    "on-failure:2".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            docker: DockerSettings::default(),
            exoframe_network: default_exoframe_network(),
            swarm: SwarmSettings::default(),
            traefik: TraefikSettings::default(),
            letsencrypt: false,
            letsencrypt_email: String::new(),
            compress: true,
            debug: false,
            default_restart_policy: default_restart_policy(),
            stack: StackSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl Settings {
    /// Resolve the explicit configuration value handed to every component
    pub fn swarm_config(&self) -> SwarmConfig {
        SwarmConfig {
            enabled: self.swarm.enabled,
            network: NetworkConfig {
                swarm_network: self
                    .swarm
                    .network
                    .clone()
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(default_swarm_network),
                local_network: self.exoframe_network.clone(),
            },
            proxy: ProxyConfig {
                name: self.traefik.name.clone(),
                image: self.traefik.image.clone(),
                extra_args: self.traefik.args.clone(),
                letsencrypt: self.letsencrypt,
                letsencrypt_email: self.letsencrypt_email.clone(),
                compress: self.compress,
                debug: self.debug,
            },
            stack_wait: StackWaitOptions {
                poll_interval: Duration::from_millis(self.stack.poll_interval_ms),
                timeout: Duration::from_secs(self.stack.timeout_secs),
            },
            default_restart_policy: self.default_restart_policy.clone(),
            docker_binary: self.docker.binary.clone(),
        }
    }
}

/// Docker engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerSettings {
    /// Engine API endpoint; `DOCKER_HOST` takes precedence when set
    #[serde(default = "default_docker_host")]
    pub host: String,

    /// Binary used for `stack deploy`
    #[serde(default = "default_docker_binary")]
    pub binary: String,
}

fn default_docker_host() -> String {
    DEFAULT_SOCKET.to_string()
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            host: default_docker_host(),
            binary: default_docker_binary(),
        }
    }
}

impl DockerSettings {
    /// Endpoint to connect to, honouring `DOCKER_HOST`
    pub fn resolved_host(&self) -> String {
        std::env::var("DOCKER_HOST")
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| self.host.clone())
    }
}

/// Swarm plugin settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwarmSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Shared overlay network; `exoframe-swarm` when unset
    #[serde(default)]
    pub network: Option<String>,
}

fn default_swarm_network() -> String {
    "exoframe-swarm".to_string()
}

/// Routing proxy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraefikSettings {
    #[serde(default = "default_traefik_name")]
    pub name: String,

    #[serde(default = "default_traefik_image")]
    pub image: String,

    /// Extra arguments appended to the generated command line
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_traefik_name() -> String {
    "exo-traefik".to_string()
}

fn default_traefik_image() -> String {
    "traefik:1.7".to_string()
}

impl Default for TraefikSettings {
    fn default() -> Self {
        Self {
            name: default_traefik_name(),
            image: default_traefik_image(),
            args: Vec::new(),
        }
    }
}

/// Stack readiness settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_stack_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_stack_timeout_secs() -> u64 {
    300
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_stack_timeout_secs(),
        }
    }
}

/// Local HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}
