//! Deployment status events
//!
//! Every top-level operation reports progress as an ordered sequence of
//! events pushed into an [`EventSink`]. The stream ends when the sink is
//! dropped, so each operation closes it exactly once on every exit path.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use swarm_api::ServiceRecord;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::errors::DeployerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Verbose,
    Error,
}

/// One record of a deployment's status stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub message: String,
    pub level: EventLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Final deployed services, set on the terminal success event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployments: Option<Vec<ServiceRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<String>,
}

impl StatusEvent {
    pub fn new(level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
            data: None,
            deployments: None,
            exit_code: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(EventLevel::Info, message)
    }

    pub fn verbose(message: impl Into<String>) -> Self {
        Self::new(EventLevel::Verbose, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventLevel::Error, message)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_deployments(mut self, deployments: Vec<ServiceRecord>) -> Self {
        self.deployments = Some(deployments);
        self
    }

    /// Terminal error event for a failed operation
    pub fn from_error(err: &DeployerError) -> Self {
        let event = Self::error(err.to_string());
        match err {
            DeployerError::ComposeVersion { definition } => event.with_data(definition.clone()),
            DeployerError::DeployCommandFailed { exit_code } => Self {
                exit_code: Some(exit_code.to_string()),
                ..event
            },
            DeployerError::MissingImage { candidates, .. } => {
                event.with_data(serde_json::json!({ "candidates": candidates }))
            }
            _ => event,
        }
    }
}

/// Sending half of a status stream
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: UnboundedSender<StatusEvent>,
}

impl EventSink {
    /// Create a sink and the receiver its events arrive on
    pub fn channel() -> (Self, UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: StatusEvent) {
        debug!("[{:?}] {}", event.level, event.message);
        if self.tx.send(event).is_err() {
            warn!("Status stream receiver dropped, event discarded");
        }
    }

    /// Whether the receiving side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Render a status stream as newline-delimited JSON
pub fn ndjson(
    rx: UnboundedReceiver<StatusEvent>,
) -> BoxStream<'static, Result<Bytes, DeployerError>> {
    stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        let line = serde_json::to_vec(&event).map(|mut line| {
            line.push(b'\n');
            Bytes::from(line)
        });
        Some((line.map_err(DeployerError::from), rx))
    })
    .boxed()
}

/// Collect every event of a closed stream
pub async fn drain(mut rx: UnboundedReceiver<StatusEvent>) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}
