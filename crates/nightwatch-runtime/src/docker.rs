use std::future::Future;
use std::pin::Pin;

use bollard::container::{InspectContainerOptions, ListContainersOptions, LogsOptions};
use bollard::Docker;
use futures::stream::{BoxStream, StreamExt};

use crate::driver::{
    ContainerInspection, ContainerSummary, HealthStatus, LogStream, RawLogFrame, RuntimeDriver,
};
use crate::error::RuntimeError;

/// `RuntimeDriver` backed by the Docker Engine API.
///
/// Owns a single `bollard::Docker` handle behind an `Arc`-free `Clone`
/// (bollard's client is itself a cheap handle), matching the teacher's
/// pattern of one manager owning one external engine connection.
#[derive(Clone)]
pub struct DockerDriver {
    client: Docker,
}

impl DockerDriver {
    pub fn connect() -> Result<Self, RuntimeError> {
        let client = Docker::connect_with_local_defaults()?;
        Ok(Self { client })
    }

    #[cfg(unix)]
    pub fn connect_socket(path: &str) -> Result<Self, RuntimeError> {
        let client = Docker::connect_with_unix(path, 120, bollard::API_DEFAULT_VERSION)?;
        Ok(Self { client })
    }
}

fn map_health(inspect: &bollard::models::ContainerInspectResponse) -> Option<HealthStatus> {
    let health = inspect.state.as_ref()?.health.as_ref()?;
    Some(HealthStatus {
        status: health
            .status
            .map(|s| format!("{s:?}").to_lowercase())
            .unwrap_or_else(|| "none".into()),
        failing_streak: health.failing_streak.unwrap_or(0),
    })
}

impl RuntimeDriver for DockerDriver {
    fn list_containers<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ContainerSummary>, RuntimeError>> + Send + 'a>>
    {
        Box::pin(async move {
            let options = ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            };
            let containers = self.client.list_containers(Some(options)).await?;

            Ok(containers
                .into_iter()
                .map(|c| ContainerSummary {
                    id: c.id.unwrap_or_default(),
                    name: c
                        .names
                        .unwrap_or_default()
                        .into_iter()
                        .next()
                        .unwrap_or_default()
                        .trim_start_matches('/')
                        .to_string(),
                    image: c.image.unwrap_or_default(),
                    state: c.state.unwrap_or_default(),
                    status: c.status.unwrap_or_default(),
                })
                .collect())
        })
    }

    fn inspect_container<'a>(
        &'a self,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ContainerInspection, RuntimeError>> + Send + 'a>> {
        Box::pin(async move {
            let inspect = self
                .client
                .inspect_container(name, None::<InspectContainerOptions>)
                .await
                .map_err(|e| RuntimeError::InspectFailed(format!("{name}: {e}")))?;

            let state = inspect.state.clone().unwrap_or_default();
            let host_config = inspect.host_config.clone().unwrap_or_default();
            let config = inspect.config.clone().unwrap_or_default();
            let network_settings = inspect.network_settings.clone().unwrap_or_default();

            let env_keys = config
                .env
                .unwrap_or_default()
                .into_iter()
                .filter_map(|kv| kv.split('=').next().map(str::to_string))
                .collect();

            let mounts = inspect
                .mounts
                .unwrap_or_default()
                .into_iter()
                .filter_map(|m| m.destination)
                .collect();

            let ports = network_settings
                .ports
                .unwrap_or_default()
                .keys()
                .cloned()
                .collect();

            Ok(ContainerInspection {
                running: state.running.unwrap_or(false),
                oom_killed: state.oom_killed.unwrap_or(false),
                restart_count: inspect.restart_count.unwrap_or(0),
                exit_code: state.exit_code.unwrap_or(0),
                health: map_health(&inspect),
                memory_limit_bytes: host_config.memory,
                cpu_limit_nanos: host_config.nano_cpus,
                env_keys,
                restart_policy: host_config
                    .restart_policy
                    .and_then(|p| p.name)
                    .map(|n| format!("{n:?}").to_lowercase())
                    .unwrap_or_else(|| "no".into()),
                mounts,
                network_mode: host_config.network_mode.unwrap_or_default(),
                ports,
            })
        })
    }

    fn follow_logs<'a>(
        &'a self,
        name: &'a str,
    ) -> Pin<
        Box<
            dyn Future<
                    Output = Result<BoxStream<'static, Result<RawLogFrame, RuntimeError>>, RuntimeError>,
                > + Send
                + 'a,
        >,
    > {
        Box::pin(async move {
            let now = chrono::Utc::now().timestamp();
            let options = LogsOptions::<String> {
                follow: true,
                stdout: true,
                stderr: true,
                since: now,
                tail: "0".to_string(),
                ..Default::default()
            };

            let container = name.to_string();
            let stream = self
                .client
                .logs(name, Some(options))
                .map(move |item| {
                    item.map(|output| frame_from_output(&container, output))
                        .map_err(|e| RuntimeError::LogStreamFailed(e.to_string()))
                })
                .boxed();

            Ok(stream)
        })
    }
}

fn frame_from_output(container: &str, output: bollard::container::LogOutput) -> RawLogFrame {
    use bollard::container::LogOutput;
    let (stream, bytes) = match output {
        LogOutput::StdOut { message } => (LogStream::Stdout, message),
        LogOutput::StdErr { message } => (LogStream::Stderr, message),
        LogOutput::Console { message } => (LogStream::Stdout, message),
        LogOutput::StdIn { message } => (LogStream::Stdout, message),
    };
    RawLogFrame {
        container: container.to_string(),
        stream,
        data: String::from_utf8_lossy(&bytes).to_string(),
    }
}
