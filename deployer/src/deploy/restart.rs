//! Restart policy parsing
//!
//! Policies are written as `none`, `any` or `on-failure[:N]`. Any unambiguous
//! prefix of a condition is accepted (`on` for `on-failure`); a retry count
//! that is missing or not a number falls back to [`DEFAULT_RETRY_COUNT`].

use std::fmt;
use std::str::FromStr;

use swarm_api::RestartPolicySpec;

use crate::errors::DeployerError;

pub const DEFAULT_RETRY_COUNT: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartCondition {
    None,
    OnFailure,
    Any,
}

impl RestartCondition {
    const ALL: [RestartCondition; 3] = [
        RestartCondition::None,
        RestartCondition::OnFailure,
        RestartCondition::Any,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RestartCondition::None => "none",
            RestartCondition::OnFailure => "on-failure",
            RestartCondition::Any => "any",
        }
    }
}

impl fmt::Display for RestartCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub condition: RestartCondition,
    /// Only meaningful for `on-failure`
    pub maximum_retry_count: Option<u64>,
}

impl FromStr for RestartPolicy {
    type Err = DeployerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_lowercase();
        let (head, count) = match value.split_once(':') {
            Some((head, count)) => (head, Some(count)),
            None => (value.as_str(), None),
        };

        let matches: Vec<RestartCondition> = if head.is_empty() {
            Vec::new()
        } else {
            RestartCondition::ALL
                .into_iter()
                .filter(|c| c.as_str().starts_with(head))
                .collect()
        };
        let condition = match matches.as_slice() {
            [condition] => *condition,
            _ => return Err(DeployerError::InvalidRestartPolicy(s.to_string())),
        };

        let maximum_retry_count = match condition {
            RestartCondition::OnFailure => Some(
                count
                    .and_then(|c| c.trim().parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_COUNT),
            ),
            _ => None,
        };

        Ok(Self {
            condition,
            maximum_retry_count,
        })
    }
}

impl From<RestartPolicy> for RestartPolicySpec {
    fn from(policy: RestartPolicy) -> Self {
        RestartPolicySpec {
            condition: Some(policy.condition.to_string()),
            max_attempts: policy.maximum_retry_count,
        }
    }
}
