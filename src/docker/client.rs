// src/docker/client.rs

//! The daemon client.
//!
//! [`DockerClient`] is the seam the step runners talk to; [`DaemonClient`]
//! is the production implementation backed by `bollard`. Every potentially
//! long call takes the run's cancellation token and aborts promptly when it
//! fires; cleanup-related calls deliberately take no token, because cleanup
//! runs *after* cancellation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogsOptions, NetworkingConfig, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{BuildImageOptions, CreateImageOptions};
use bollard::network::CreateNetworkOptions;
use bollard::secret::{
    DeviceMapping, EndpointSettings, HealthConfig, HealthStatusEnum, HostConfig,
    HostConfigLogConfig, PortBinding,
};
use bollard::Docker;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::model::PullPolicy;
use crate::dag::Container;
use crate::docker::types::{
    CreateContainerRequest, DockerContainer, DockerImage, DockerNetwork, HealthOutcome,
};
use crate::errors::{Result, TaskdockError};

/// Callback for streaming build/pull progress lines.
pub type ProgressSink<'a> = &'a (dyn Fn(String) + Send + Sync);

/// Operations the engine needs from the daemon.
#[async_trait]
pub trait DockerClient: Send + Sync {
    async fn create_network(&self, name: &str) -> Result<DockerNetwork>;

    async fn remove_network(&self, network: &DockerNetwork) -> Result<()>;

    async fn build_image(
        &self,
        container: &Container,
        context_dir: &Path,
        tag: &str,
        progress: ProgressSink<'_>,
        token: &CancellationToken,
    ) -> Result<DockerImage>;

    async fn pull_image(
        &self,
        reference: &str,
        policy: PullPolicy,
        progress: ProgressSink<'_>,
        token: &CancellationToken,
    ) -> Result<DockerImage>;

    async fn create_container(&self, request: &CreateContainerRequest)
        -> Result<DockerContainer>;

    async fn start_container(&self, handle: &DockerContainer) -> Result<()>;

    async fn wait_for_health(
        &self,
        container: &Container,
        handle: &DockerContainer,
        token: &CancellationToken,
    ) -> Result<HealthOutcome>;

    /// Stream the container's output to the terminal and wait for it to
    /// exit; returns the exit code.
    async fn run_attached(
        &self,
        handle: &DockerContainer,
        token: &CancellationToken,
    ) -> Result<i64>;

    /// Run a command inside a running container; returns its exit code.
    async fn exec(
        &self,
        handle: &DockerContainer,
        command: &str,
        working_directory: Option<&str>,
        token: &CancellationToken,
    ) -> Result<i64>;

    async fn stop_container(&self, handle: &DockerContainer) -> Result<()>;

    async fn remove_container(&self, handle: &DockerContainer) -> Result<()>;
}

/// Production client talking to the local daemon over its unix socket.
pub struct DaemonClient {
    docker: Docker,
}

impl DaemonClient {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_unix_defaults()?;
        Ok(Self { docker })
    }
}

fn cancelled() -> TaskdockError {
    TaskdockError::DockerError("operation cancelled".to_string())
}

#[async_trait]
impl DockerClient for DaemonClient {
    async fn create_network(&self, name: &str) -> Result<DockerNetwork> {
        let response = self
            .docker
            .create_network(CreateNetworkOptions {
                name: name.to_string(),
                driver: "bridge".to_string(),
                ..Default::default()
            })
            .await?;

        let id = response.id.unwrap_or_else(|| name.to_string());
        debug!(network = %name, id = %id, "task network created");

        Ok(DockerNetwork::new(id, name))
    }

    async fn remove_network(&self, network: &DockerNetwork) -> Result<()> {
        self.docker.remove_network(&network.id).await?;
        Ok(())
    }

    async fn build_image(
        &self,
        container: &Container,
        context_dir: &Path,
        tag: &str,
        progress: ProgressSink<'_>,
        token: &CancellationToken,
    ) -> Result<DockerImage> {
        let context = tar_build_context(context_dir)?;

        let options = BuildImageOptions {
            t: tag.to_string(),
            dockerfile: "Dockerfile".to_string(),
            rm: true,
            ..Default::default()
        };

        let mut stream = self.docker.build_image(options, None, Some(context.into()));
        let mut image_id: Option<String> = None;

        loop {
            let next = tokio::select! {
                _ = token.cancelled() => return Err(cancelled()),
                next = stream.next() => next,
            };

            let info = match next {
                Some(info) => info?,
                None => break,
            };

            if let Some(error) = info.error {
                return Err(TaskdockError::DockerError(error));
            }
            if let Some(line) = info.stream {
                let line = line.trim_end().to_string();
                if !line.is_empty() {
                    progress(line);
                }
            }
            if let Some(aux) = info.aux {
                if let Some(id) = aux.id {
                    image_id = Some(id);
                }
            }
        }

        let image = DockerImage::new(image_id.unwrap_or_else(|| tag.to_string()));
        debug!(container = %container.name, image = %image.id, "image built");
        Ok(image)
    }

    async fn pull_image(
        &self,
        reference: &str,
        policy: PullPolicy,
        progress: ProgressSink<'_>,
        token: &CancellationToken,
    ) -> Result<DockerImage> {
        if policy == PullPolicy::IfNotPresent {
            if let Ok(inspect) = self.docker.inspect_image(reference).await {
                debug!(image = %reference, "image already present; skipping pull");
                return Ok(DockerImage::new(
                    inspect.id.unwrap_or_else(|| reference.to_string()),
                ));
            }
        }

        let mut stream = self.docker.create_image(
            Some(CreateImageOptions {
                from_image: reference.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );

        loop {
            let next = tokio::select! {
                _ = token.cancelled() => return Err(cancelled()),
                next = stream.next() => next,
            };

            let info = match next {
                Some(info) => info?,
                None => break,
            };

            if let Some(status) = info.status {
                progress(status);
            }
        }

        let inspect = self.docker.inspect_image(reference).await?;
        Ok(DockerImage::new(
            inspect.id.unwrap_or_else(|| reference.to_string()),
        ))
    }

    async fn create_container(
        &self,
        request: &CreateContainerRequest,
    ) -> Result<DockerContainer> {
        let config = container_config(request)?;

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: request.name.clone(),
                    ..Default::default()
                }),
                config,
            )
            .await?;

        debug!(container = %request.name, id = %response.id, "container created");
        Ok(DockerContainer::new(response.id, request.name.clone()))
    }

    async fn start_container(&self, handle: &DockerContainer) -> Result<()> {
        self.docker
            .start_container(&handle.id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn wait_for_health(
        &self,
        container: &Container,
        handle: &DockerContainer,
        token: &CancellationToken,
    ) -> Result<HealthOutcome> {
        let interval = container
            .config
            .health_check
            .as_ref()
            .map(|hc| hc.effective_interval())
            .unwrap_or(std::time::Duration::from_millis(200));

        loop {
            if token.is_cancelled() {
                return Err(cancelled());
            }

            let inspect = self.docker.inspect_container(&handle.id, None).await?;
            let state = inspect.state.unwrap_or_default();

            match state.health.and_then(|h| h.status) {
                Some(HealthStatusEnum::HEALTHY) => return Ok(HealthOutcome::Healthy),
                Some(HealthStatusEnum::UNHEALTHY) => {
                    return Ok(HealthOutcome::Unhealthy(
                        "container reported unhealthy".to_string(),
                    ));
                }
                Some(HealthStatusEnum::STARTING) => {}
                Some(HealthStatusEnum::NONE) | Some(HealthStatusEnum::EMPTY) | None => {
                    return Ok(HealthOutcome::NoHealthCheck);
                }
            }

            // Starting: the container may still die before its first
            // successful check.
            if state.running == Some(false) {
                return Ok(HealthOutcome::Unhealthy(format!(
                    "container exited with code {} before becoming healthy",
                    state.exit_code.unwrap_or(-1)
                )));
            }

            tokio::select! {
                _ = token.cancelled() => return Err(cancelled()),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    async fn run_attached(
        &self,
        handle: &DockerContainer,
        token: &CancellationToken,
    ) -> Result<i64> {
        // Follow logs from the beginning so nothing emitted between start
        // and attach is lost.
        let mut logs = self.docker.logs(
            &handle.id,
            Some(LogsOptions::<String> {
                follow: true,
                stdout: true,
                stderr: true,
                tail: "all".to_string(),
                ..Default::default()
            }),
        );

        let mut stdout = tokio::io::stdout();

        let mut wait = self
            .docker
            .wait_container(&handle.id, None::<WaitContainerOptions<String>>);

        let mut logs_done = false;

        loop {
            tokio::select! {
                _ = token.cancelled() => return Err(cancelled()),
                log = logs.next(), if !logs_done => {
                    match log {
                        Some(Ok(output)) => {
                            let _ = stdout.write_all(&output.into_bytes()).await;
                            let _ = stdout.flush().await;
                        }
                        Some(Err(_)) | None => logs_done = true,
                    }
                }
                exit = wait.next() => {
                    return match exit {
                        Some(Ok(response)) => Ok(response.status_code),
                        Some(Err(bollard::errors::Error::DockerContainerWaitError {
                            code,
                            ..
                        })) => Ok(code),
                        Some(Err(err)) => Err(err.into()),
                        None => Err(TaskdockError::DockerError(
                            "wait stream ended without an exit status".to_string(),
                        )),
                    };
                }
            }
        }
    }

    async fn exec(
        &self,
        handle: &DockerContainer,
        command: &str,
        working_directory: Option<&str>,
        token: &CancellationToken,
    ) -> Result<i64> {
        let exec = self
            .docker
            .create_exec(
                &handle.id,
                CreateExecOptions {
                    cmd: Some(vec![
                        "/bin/sh".to_string(),
                        "-c".to_string(),
                        command.to_string(),
                    ]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: working_directory.map(|d| d.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        let results = self.docker.start_exec(&exec.id, None).await?;

        if let StartExecResults::Attached { mut output, .. } = results {
            let mut stdout = tokio::io::stdout();
            loop {
                let next = tokio::select! {
                    _ = token.cancelled() => return Err(cancelled()),
                    next = output.next() => next,
                };
                match next {
                    Some(Ok(chunk)) => {
                        let _ = stdout.write_all(&chunk.into_bytes()).await;
                        let _ = stdout.flush().await;
                    }
                    Some(Err(err)) => return Err(err.into()),
                    None => break,
                }
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        Ok(inspect.exit_code.unwrap_or(0))
    }

    async fn stop_container(&self, handle: &DockerContainer) -> Result<()> {
        self.docker
            .stop_container(&handle.id, Some(StopContainerOptions { t: 10 }))
            .await?;
        Ok(())
    }

    async fn remove_container(&self, handle: &DockerContainer) -> Result<()> {
        self.docker
            .remove_container(
                &handle.id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }
}

/// Pack a build context directory into an uncompressed tarball.
fn tar_build_context(dir: &Path) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append_dir_all(".", dir)
        .map_err(TaskdockError::IoError)?;
    builder.into_inner().map_err(TaskdockError::IoError)
}

/// Translate a resolved create request into the daemon's container config.
fn container_config(request: &CreateContainerRequest) -> Result<Config<String>> {
    let container = &request.container;
    let cfg = &container.config;

    let env: Vec<String> = request
        .environment
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();

    let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
    let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    for mapping in cfg.ports.iter() {
        let (host, container_port) = split_mapping(mapping).ok_or_else(|| {
            TaskdockError::ConfigError(format!(
                "invalid port mapping '{mapping}' for container '{}'",
                container.name
            ))
        })?;
        let key = format!("{container_port}/tcp");
        exposed_ports.insert(key.clone(), HashMap::new());
        port_bindings.insert(
            key,
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(host.to_string()),
            }]),
        );
    }

    let binds: Vec<String> = cfg
        .volumes
        .iter()
        .map(|v| absolutise_volume(v))
        .collect();

    let devices: Vec<DeviceMapping> = cfg
        .devices
        .iter()
        .filter_map(|d| {
            let mut parts = d.splitn(3, ':');
            let host = parts.next()?;
            let inside = parts.next().unwrap_or(host);
            let permissions = parts.next().unwrap_or("rwm");
            Some(DeviceMapping {
                path_on_host: Some(host.to_string()),
                path_in_container: Some(inside.to_string()),
                cgroup_permissions: Some(permissions.to_string()),
            })
        })
        .collect();

    let extra_hosts: Vec<String> = cfg
        .additional_hosts
        .iter()
        .map(|(host, ip)| format!("{host}:{ip}"))
        .collect();

    let log_config = cfg.log_driver.as_ref().map(|driver| HostConfigLogConfig {
        typ: Some(driver.clone()),
        config: Some(cfg.log_options.clone().into_iter().collect()),
    });

    let host_config = HostConfig {
        binds: (!binds.is_empty()).then_some(binds),
        devices: (!devices.is_empty()).then_some(devices),
        port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
        privileged: Some(cfg.privileged),
        init: Some(cfg.enable_init_process),
        cap_add: (!cfg.capabilities_to_add.is_empty())
            .then(|| cfg.capabilities_to_add.clone()),
        cap_drop: (!cfg.capabilities_to_drop.is_empty())
            .then(|| cfg.capabilities_to_drop.clone()),
        extra_hosts: (!extra_hosts.is_empty()).then_some(extra_hosts),
        shm_size: cfg.shm_size,
        log_config,
        network_mode: Some(request.network.name.clone()),
        ..Default::default()
    };

    // The container is reachable on the task network under its config name
    // plus any additional hostnames.
    let mut aliases = vec![container.name.clone()];
    aliases.extend(cfg.additional_hostnames.iter().cloned());

    let mut endpoints: HashMap<String, EndpointSettings> = HashMap::new();
    endpoints.insert(
        request.network.name.clone(),
        EndpointSettings {
            aliases: Some(aliases),
            ..Default::default()
        },
    );

    let health_config = cfg.health_check.as_ref().and_then(health_config);

    Ok(Config {
        image: Some(request.image.id.clone()),
        cmd: cfg.command.as_deref().map(split_command),
        entrypoint: cfg.entrypoint.as_deref().map(split_command),
        env: Some(env),
        working_dir: cfg.working_directory.clone(),
        user: request.user.clone(),
        exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
        healthcheck: health_config,
        host_config: Some(host_config),
        networking_config: Some(NetworkingConfig {
            endpoints_config: endpoints,
        }),
        ..Default::default()
    })
}

fn health_config(hc: &crate::config::model::HealthCheckConfig) -> Option<HealthConfig> {
    let command = hc.command.as_ref()?;

    Some(HealthConfig {
        test: Some(vec!["CMD-SHELL".to_string(), command.clone()]),
        interval: Some(hc.effective_interval().as_nanos() as i64),
        retries: Some(hc.effective_retries() as i64),
        start_period: Some(hc.effective_start_period().as_nanos() as i64),
        ..Default::default()
    })
}

/// Split `"host:container"`; both sides required.
fn split_mapping(s: &str) -> Option<(&str, &str)> {
    let mut parts = s.splitn(2, ':');
    let host = parts.next()?;
    let container = parts.next()?;
    Some((host, container))
}

/// Expand a relative local path in a volume spec to an absolute one, since
/// the daemon interprets relative binds as named volumes.
fn absolutise_volume(spec: &str) -> String {
    let mut parts = spec.splitn(2, ':');
    let local = parts.next().unwrap_or(spec);
    let rest = parts.next();

    let local_path = PathBuf::from(local);
    let absolute = if local_path.is_absolute() {
        local_path
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&local_path))
            .unwrap_or(local_path)
    };

    match rest {
        Some(rest) => format!("{}:{rest}", absolute.display()),
        None => absolute.display().to_string(),
    }
}

/// Naive whitespace split for command/entrypoint strings.
fn split_command(s: &str) -> Vec<String> {
    s.split_whitespace().map(|p| p.to_string()).collect()
}
