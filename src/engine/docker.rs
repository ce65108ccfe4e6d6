//! Docker implementation of [`ContainerRuntime`]

use async_trait::async_trait;
use bollard::{
    Docker,
    auth::DockerCredentials,
    container::LogOutput,
    errors::Error as DockerError,
    exec::{CreateExecOptions, StartExecResults},
    models::{ContainerCreateBody, HostConfig, Mount, MountTypeEnum},
    query_parameters::{
        CreateContainerOptionsBuilder, CreateImageOptionsBuilder, InspectContainerOptions,
        RemoveContainerOptionsBuilder, StartContainerOptions, StopContainerOptionsBuilder,
    },
};
use futures::StreamExt;

use super::runtime::{ContainerInfo, ContainerRuntime, ContainerSpec, ExecOutput};
use crate::{config::DockerConfig, constants, error::AppResult};

fn is_not_found(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn is_not_modified(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 304,
            ..
        }
    )
}

/// Runtime talking to a Docker daemon
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
    credentials: Option<DockerCredentials>,
}

impl DockerRuntime {
    /// Wrap a connected client; registry credentials come from config
    pub fn new(docker: Docker, config: &DockerConfig) -> Self {
        let credentials = match (&config.username, &config.password) {
            (Some(username), Some(password)) => Some(DockerCredentials {
                username: Some(username.clone()),
                password: Some(password.clone()),
                serveraddress: config.registry.clone(),
                ..Default::default()
            }),
            _ => None,
        };

        Self {
            docker,
            credentials,
        }
    }

    /// Connect to the configured socket
    pub fn connect(config: &DockerConfig) -> AppResult<Self> {
        let docker = Docker::connect_with_socket(
            &config.socket_path,
            config.exec_timeout_secs.max(120),
            bollard::API_DEFAULT_VERSION,
        )?;
        Ok(Self::new(docker, config))
    }

    pub fn docker(&self) -> &Docker {
        &self.docker
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn image_exists(&self, image: &str) -> AppResult<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn pull(&self, image: &str) -> AppResult<()> {
        let options = CreateImageOptionsBuilder::default()
            .from_image(image)
            .build();

        let mut stream = self
            .docker
            .create_image(Some(options), None, self.credentials.clone());

        while let Some(progress) = stream.next().await {
            let info = progress?;
            if let Some(status) = info.status {
                tracing::debug!(image, status = %status, "pull progress");
            }
        }

        Ok(())
    }

    async fn inspect(&self, container: &str) -> AppResult<Option<ContainerInfo>> {
        let response = match self
            .docker
            .inspect_container(container, None::<InspectContainerOptions>)
            .await
        {
            Ok(response) => response,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(ContainerInfo {
            id: response.id.unwrap_or_default(),
            running: response
                .state
                .and_then(|state| state.running)
                .unwrap_or(false),
            labels: response
                .config
                .and_then(|config| config.labels)
                .unwrap_or_default(),
        }))
    }

    async fn start(&self, spec: &ContainerSpec) -> AppResult<String> {
        let options = CreateContainerOptionsBuilder::default()
            .name(&spec.name)
            .build();

        let mounts = spec
            .mounts
            .iter()
            .map(|m| Mount {
                source: Some(m.source.clone()),
                target: Some(m.target.clone()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let host_config = HostConfig {
            mounts: Some(mounts),
            network_mode: spec.network_mode.clone(),
            ..Default::default()
        };

        // tty + open stdin keep the image's default shell alive between execs
        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            tty: Some(true),
            open_stdin: Some(true),
            host_config: Some(host_config),
            env: Some(spec.env.clone()),
            labels: Some(spec.labels.clone()),
            ..Default::default()
        };

        let container = self.docker.create_container(Some(options), body).await?;

        self.docker
            .start_container(&container.id, None::<StartContainerOptions>)
            .await?;

        Ok(container.id)
    }

    async fn exec(&self, container: &str, cmd: &[String]) -> AppResult<ExecOutput> {
        let exec = self
            .docker
            .create_exec(
                container,
                CreateExecOptions {
                    cmd: Some(cmd.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let output = self.docker.start_exec(&exec.id, None).await?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = output {
            while let Some(msg) = output.next().await {
                match msg? {
                    LogOutput::StdOut { message } | LogOutput::Console { message } => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdErr { message } => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    _ => {}
                }
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code: inspect.exit_code.unwrap_or(-1),
        })
    }

    async fn stop(&self, container: &str) -> AppResult<()> {
        let options = StopContainerOptionsBuilder::default()
            .t(constants::CONTAINER_STOP_GRACE_SECS)
            .build();

        match self.docker.stop_container(container, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) || is_not_modified(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, container: &str) -> AppResult<()> {
        let options = RemoveContainerOptionsBuilder::default().force(true).build();

        match self.docker.remove_container(container, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
