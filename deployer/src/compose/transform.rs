//! Stack retargeting
//!
//! Rewrites a compose definition written for the local engine so the stack
//! command can run it on the cluster: built services point at their pre-built
//! images, every service joins the shared overlay network in place of the
//! local one, and labels move under `deploy.labels` where the orchestrator
//! reads them.

use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};

use crate::compose::StackDefinition;
use crate::config::NetworkConfig;
use crate::errors::DeployerError;
use crate::labels::{stack_service_name, TRAEFIK_NETWORK};
use crate::utils::strip_dashes;

/// Image names a built service may have been tagged with, in lookup order
pub fn image_candidates(base_name: &str, service_key: &str) -> Vec<String> {
    let exact = format!("{}:latest", stack_service_name(base_name, service_key));
    let stripped = strip_dashes(&exact);
    if stripped == exact {
        vec![exact]
    } else {
        vec![exact, stripped]
    }
}

/// First candidate present among the built images
pub fn resolve_image(
    base_name: &str,
    service_key: &str,
    images: &[String],
) -> Result<String, DeployerError> {
    let candidates = image_candidates(base_name, service_key);
    candidates
        .iter()
        .find(|candidate| images.contains(candidate))
        .cloned()
        .ok_or_else(|| DeployerError::MissingImage {
            service: service_key.to_string(),
            candidates,
        })
}

/// Normalise a compose label block, which may be a `key=value` list or a map
pub fn label_map(value: &Value) -> Mapping {
    let mut labels = Mapping::new();
    match value {
        Value::Mapping(map) => {
            for (k, v) in map {
                labels.insert(k.clone(), scalar_string(v));
            }
        }
        Value::Sequence(items) => {
            for item in items.iter().filter_map(Value::as_str) {
                let (k, v) = item.split_once('=').unwrap_or((item, ""));
                labels.insert(Value::from(k), Value::from(v));
            }
        }
        _ => {}
    }
    labels
}

fn scalar_string(value: &Value) -> Value {
    match value {
        Value::String(_) => value.clone(),
        Value::Bool(b) => Value::from(b.to_string()),
        Value::Number(n) => Value::from(n.to_string()),
        Value::Null => Value::from(""),
        other => other.clone(),
    }
}

fn external_network() -> Value {
    let mut network = Mapping::new();
    network.insert(Value::from("external"), Value::Bool(true));
    Value::Mapping(network)
}

fn retarget_networks(root: &mut Mapping, config: &NetworkConfig) {
    let mut networks = Mapping::new();
    networks.insert(Value::from(config.swarm_network.as_str()), external_network());

    if let Some(Value::Mapping(declared)) = root.get("networks") {
        for (name, value) in declared {
            match name.as_str() {
                Some(n) if n == config.swarm_network || n == config.local_network => continue,
                _ => {
                    networks.insert(name.clone(), value.clone());
                }
            }
        }
    }

    root.insert(Value::from("networks"), Value::Mapping(networks));
}

fn retarget_service_networks(service: &mut Mapping, config: &NetworkConfig) {
    let shared = Value::from(config.swarm_network.as_str());
    let keep = |name: &Value| {
        name.as_str()
            .map(|n| n != config.swarm_network && n != config.local_network)
            .unwrap_or(true)
    };

    let networks = match service.get("networks") {
        Some(Value::Mapping(declared)) => {
            let shared_value = declared.get(&shared).cloned().unwrap_or(Value::Null);
            let mut networks = Mapping::new();
            networks.insert(shared.clone(), shared_value);
            for (name, value) in declared.iter().filter(|(name, _)| keep(name)) {
                networks.insert(name.clone(), value.clone());
            }
            Value::Mapping(networks)
        }
        Some(Value::Sequence(declared)) => {
            let mut networks = vec![shared.clone()];
            for name in declared.iter().filter(|name| keep(name)) {
                if !networks.contains(name) {
                    networks.push(name.clone());
                }
            }
            Value::Sequence(networks)
        }
        _ => Value::Sequence(vec![shared]),
    };

    service.insert(Value::from("networks"), networks);
}

fn relocate_labels(service_key: &str, service: &mut Mapping, config: &NetworkConfig) {
    let service_labels = service
        .remove("labels")
        .map(|labels| label_map(&labels))
        .unwrap_or_default();

    let deploy = service
        .entry(Value::from("deploy"))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if !deploy.is_mapping() {
        *deploy = Value::Mapping(Mapping::new());
    }
    let Value::Mapping(deploy) = deploy else {
        return;
    };

    let mut labels = deploy.get("labels").map(label_map).unwrap_or_default();
    for (k, v) in service_labels {
        if let Some(previous) = labels.get(&k) {
            if previous != &v {
                warn!(
                    "Service {} label {:?} overrides deploy label value {:?}",
                    service_key, k, previous
                );
            }
        }
        labels.insert(k, v);
    }
    labels.insert(
        Value::from(TRAEFIK_NETWORK),
        Value::from(config.swarm_network.as_str()),
    );

    deploy.insert(Value::from("labels"), Value::Mapping(labels));
}

/// Rewrite `definition` for a stack deploy of `base_name`
///
/// Fails with [`DeployerError::MissingImage`] before touching anything when a
/// built service has no matching image.
pub fn transform_for_stack(
    definition: &StackDefinition,
    base_name: &str,
    images: &[String],
    config: &NetworkConfig,
) -> Result<StackDefinition, DeployerError> {
    let mut stack = definition.clone();
    let keys = stack.service_keys();

    // resolve every image first so a failure leaves no partial rewrite behind
    let mut resolved = Vec::with_capacity(keys.len());
    for key in &keys {
        let builds = definition
            .service(key)
            .map(|svc| svc.contains_key("build"))
            .unwrap_or(false);
        let image = if builds {
            Some(resolve_image(base_name, key, images)?)
        } else {
            None
        };
        resolved.push(image);
    }

    let root = stack.root_mut();
    retarget_networks(root, config);

    if let Some(Value::Mapping(services)) = root.get_mut("services") {
        for (key, image) in keys.iter().zip(resolved) {
            let Some(Value::Mapping(service)) = services.get_mut(key.as_str()) else {
                continue;
            };

            if let Some(image) = image {
                debug!("Service {} uses built image {}", key, image);
                service.remove("build");
                service.insert(Value::from("image"), Value::from(image));
            }
            retarget_service_networks(service, config);
            relocate_labels(key, service, config);
        }
    }

    Ok(stack)
}
