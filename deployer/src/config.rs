//! Explicit runtime configuration threaded into every engine entry point

use std::time::Duration;

/// Networks a deployment is retargeted between
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Shared overlay network every service joins
    pub swarm_network: String,

    /// Local network compose files are written against; removed for stacks
    pub local_network: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            swarm_network: "exoframe-swarm".to_string(),
            local_network: "exoframe".to_string(),
        }
    }
}

/// Routing proxy service
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub name: String,
    pub image: String,
    pub extra_args: Vec<String>,
    pub letsencrypt: bool,
    pub letsencrypt_email: String,
    pub compress: bool,
    pub debug: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            name: "exo-traefik".to_string(),
            image: "traefik:1.7".to_string(),
            extra_args: Vec::new(),
            letsencrypt: false,
            letsencrypt_email: String::new(),
            compress: true,
            debug: false,
        }
    }
}

/// Bounds of the stack readiness wait
#[derive(Debug, Clone, Copy)]
pub struct StackWaitOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for StackWaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Swarm deployment configuration
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Capability gate; nothing is bootstrapped when false
    pub enabled: bool,
    pub network: NetworkConfig,
    pub proxy: ProxyConfig,
    pub stack_wait: StackWaitOptions,
    pub default_restart_policy: String,
    pub docker_binary: String,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            network: NetworkConfig::default(),
            proxy: ProxyConfig::default(),
            stack_wait: StackWaitOptions::default(),
            default_restart_policy: "on-failure:2".to_string(),
            docker_binary: "docker".to_string(),
        }
    }
}
