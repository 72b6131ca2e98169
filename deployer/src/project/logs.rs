//! Log aggregation

use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use futures::future::try_join_all;
use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::cluster::{LogOptions, LogStream, Orchestrator};
use crate::errors::DeployerError;
use crate::labels::PLATFORM_SERVICE;
use crate::project::{resolve, Resolution};

fn single_line(line: String) -> LogStream {
    stream::once(async move { Ok(Bytes::from(line)) }).boxed()
}

/// Log stream of the platform's own service
///
/// When the platform is not running as a cluster service a single notice
/// line is returned instead.
async fn platform_logs(
    orchestrator: &dyn Orchestrator,
    options: LogOptions,
) -> Result<LogStream, DeployerError> {
    let services = orchestrator.list_services().await?;
    match services.iter().find(|s| s.name().contains(PLATFORM_SERVICE)) {
        Some(service) => orchestrator.service_logs(&service.id, options).await,
        None => Ok(single_line(format!(
            "{} Exoframe server not running in container!\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
        ))),
    }
}

/// Logs of whatever `identifier` resolves to for `user`
///
/// A single service's stream is returned as is. For a project every stream
/// is opened up front, then replayed one after another, each preceded by a
/// `Logs for <name>` header.
pub async fn fetch_logs(
    orchestrator: &dyn Orchestrator,
    identifier: &str,
    user: &str,
    follow: bool,
) -> Result<LogStream, DeployerError> {
    let options = LogOptions::follow(follow);
    if identifier == PLATFORM_SERVICE {
        return platform_logs(orchestrator, options).await;
    }

    let services = match resolve(orchestrator, identifier, user).await? {
        Resolution::Service(service) => {
            return orchestrator.service_logs(&service.id, options).await;
        }
        Resolution::Project(services) => services,
    };

    debug!("Collecting logs of {} service(s) in {}", services.len(), identifier);
    let streams = try_join_all(
        services
            .iter()
            .map(|service| orchestrator.service_logs(&service.id, options)),
    )
    .await?;

    let sections: Vec<LogStream> = services
        .iter()
        .zip(streams)
        .map(|(service, logs)| {
            single_line(format!("Logs for {}\n\n", service.name()))
                .chain(logs)
                .boxed()
        })
        .collect();
    Ok(stream::iter(sections).flatten().boxed())
}
