// src/exec/runner.rs

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::model::ImageSource;
use crate::dag::Container;
use crate::docker::{
    host, CreateContainerRequest, DockerClient, DockerContainer, HealthOutcome,
};
use crate::engine::{StepRunner, TaskEvent, TaskStateMachine, TaskStep};

/// Production step runner.
///
/// Holds the state machine (as its event sink), the daemon client, and the
/// ambient context needed to resolve steps: the project name (for daemon
/// resource naming), the config file's directory (build contexts are
/// relative to it) and the host environment snapshot.
pub struct DockerStepRunner {
    machine: Arc<TaskStateMachine>,
    client: Arc<dyn DockerClient>,
    project_name: String,
    config_dir: PathBuf,
    host_env: BTreeMap<String, String>,
}

impl DockerStepRunner {
    pub fn new(
        machine: Arc<TaskStateMachine>,
        client: Arc<dyn DockerClient>,
        project_name: String,
        config_dir: PathBuf,
    ) -> Self {
        Self {
            machine,
            client,
            project_name,
            config_dir,
            host_env: host::host_environment(),
        }
    }

    fn post(&self, event: TaskEvent) {
        self.machine.post_event(event);
    }

    /// Name for a container on the daemon: unique per invocation so stale
    /// containers from previous runs never collide.
    fn daemon_name(&self, container: &Container) -> String {
        format!(
            "{}-{}-{}",
            self.project_name,
            container.name,
            std::process::id()
        )
    }

    async fn execute(&self, step: TaskStep) {
        let token = self.machine.cancellation_token();

        match step {
            TaskStep::PrepareTaskNetwork => {
                let name = format!("{}-task-net-{}", self.project_name, std::process::id());
                match self.client.create_network(&name).await {
                    Ok(network) => self.post(TaskEvent::TaskNetworkReady { network }),
                    Err(err) => self.post(TaskEvent::TaskNetworkCreationFailed {
                        message: err.to_string(),
                    }),
                }
            }

            TaskStep::BuildImage { container } => {
                let context_dir = match container.image_source() {
                    ImageSource::Build { directory } => self.config_dir.join(directory),
                    ImageSource::Pull { .. } => {
                        // Planner only emits this step for built images.
                        return;
                    }
                };
                let tag = format!("{}-{}", self.project_name, container.name);

                let machine = Arc::clone(&self.machine);
                let name = container.name.clone();
                let progress = move |line: String| {
                    machine.post_event(TaskEvent::ImageBuildProgress {
                        container: name.clone(),
                        progress: line,
                    });
                };

                match self
                    .client
                    .build_image(&container, &context_dir, &tag, &progress, &token)
                    .await
                {
                    Ok(image) => self.post(TaskEvent::ImageBuilt {
                        container: container.name.clone(),
                        image,
                    }),
                    Err(err) => self.post(TaskEvent::ImageBuildFailed {
                        container: container.name.clone(),
                        message: err.to_string(),
                    }),
                }
            }

            TaskStep::PullImage { container } => {
                let (reference, policy) = match container.image_source() {
                    ImageSource::Pull { reference, policy } => (reference, policy),
                    ImageSource::Build { .. } => return,
                };

                let machine = Arc::clone(&self.machine);
                let name = container.name.clone();
                let progress = move |status: String| {
                    machine.post_event(TaskEvent::ImagePullProgress {
                        container: name.clone(),
                        progress: status,
                    });
                };

                match self
                    .client
                    .pull_image(&reference, policy, &progress, &token)
                    .await
                {
                    Ok(image) => self.post(TaskEvent::ImagePulled {
                        container: container.name.clone(),
                        image,
                    }),
                    Err(err) => self.post(TaskEvent::ImagePullFailed {
                        container: container.name.clone(),
                        message: err.to_string(),
                    }),
                }
            }

            TaskStep::CreateContainer {
                container,
                image,
                network,
            } => {
                let request = CreateContainerRequest {
                    name: self.daemon_name(&container),
                    container: Arc::clone(&container),
                    image,
                    network,
                    environment: host::resolve_environment(
                        &container.config.environment,
                        &self.host_env,
                    ),
                    user: container
                        .config
                        .run_as_current_user
                        .then(host::current_user_spec)
                        .flatten(),
                };

                match self.client.create_container(&request).await {
                    Ok(handle) => self.post(TaskEvent::ContainerCreated {
                        container: container.name.clone(),
                        handle,
                    }),
                    Err(err) => self.post(TaskEvent::ContainerCreationFailed {
                        container: container.name.clone(),
                        message: err.to_string(),
                    }),
                }
            }

            TaskStep::StartContainer { container, handle } => {
                match self.client.start_container(&handle).await {
                    Ok(()) => self.post(TaskEvent::ContainerStarted {
                        container: container.name.clone(),
                    }),
                    Err(err) => self.post(TaskEvent::ContainerStartFailed {
                        container: container.name.clone(),
                        message: err.to_string(),
                    }),
                }
            }

            TaskStep::WaitForHealth { container, handle } => {
                match self
                    .client
                    .wait_for_health(&container, &handle, &token)
                    .await
                {
                    Ok(HealthOutcome::Healthy) | Ok(HealthOutcome::NoHealthCheck) => {
                        self.post(TaskEvent::ContainerBecameHealthy {
                            container: container.name.clone(),
                        });
                    }
                    Ok(HealthOutcome::Unhealthy(message)) => {
                        self.post(TaskEvent::ContainerDidNotBecomeHealthy {
                            container: container.name.clone(),
                            message,
                        });
                    }
                    Err(err) => self.post(TaskEvent::ContainerDidNotBecomeHealthy {
                        container: container.name.clone(),
                        message: err.to_string(),
                    }),
                }
            }

            TaskStep::RunSetupCommands { container, handle } => {
                self.run_setup_commands(&container, &handle).await;
            }

            TaskStep::RunContainer { container, handle } => {
                info!(container = %container.name, "running task container");
                match self.client.run_attached(&handle, &token).await {
                    Ok(exit_code) => self.post(TaskEvent::RunningContainerExited {
                        container: container.name.clone(),
                        exit_code,
                    }),
                    Err(err) => self.post(TaskEvent::ContainerRunFailed {
                        container: container.name.clone(),
                        message: err.to_string(),
                    }),
                }
            }

            // Cleanup steps run after cancellation, so none of them consult
            // the token.
            TaskStep::StopContainer { container, handle } => {
                match self.client.stop_container(&handle).await {
                    Ok(()) => self.post(TaskEvent::ContainerStopped { container }),
                    Err(err) => self.post(TaskEvent::ContainerStopFailed {
                        container,
                        message: err.to_string(),
                    }),
                }
            }

            TaskStep::RemoveContainer { container, handle } => {
                match self.client.remove_container(&handle).await {
                    Ok(()) => self.post(TaskEvent::ContainerRemoved { container }),
                    Err(err) => self.post(TaskEvent::ContainerRemovalFailed {
                        container,
                        message: err.to_string(),
                    }),
                }
            }

            TaskStep::DeleteTaskNetwork { network } => {
                match self.client.remove_network(&network).await {
                    Ok(()) => self.post(TaskEvent::TaskNetworkRemoved),
                    Err(err) => self.post(TaskEvent::TaskNetworkDeletionFailed {
                        message: err.to_string(),
                    }),
                }
            }
        }
    }

    async fn run_setup_commands(&self, container: &Arc<Container>, handle: &DockerContainer) {
        let token = self.machine.cancellation_token();

        if !container.has_setup_commands() {
            // No commands declared: synthesize immediate success so the
            // rules that gate on completion can fire.
            debug!(container = %container.name, "no setup commands; completing immediately");
            self.post(TaskEvent::SetupCommandsCompleted {
                container: container.name.clone(),
            });
            return;
        }

        for setup in container.config.setup_commands.iter() {
            info!(
                container = %container.name,
                command = %setup.command,
                "running setup command"
            );

            let result = self
                .client
                .exec(
                    handle,
                    &setup.command,
                    setup
                        .working_directory
                        .as_deref()
                        .or(container.config.working_directory.as_deref()),
                    &token,
                )
                .await;

            match result {
                Ok(0) => {}
                Ok(code) => {
                    self.post(TaskEvent::SetupCommandFailed {
                        container: container.name.clone(),
                        command: setup.command.clone(),
                        message: format!("command exited with code {code}"),
                    });
                    return;
                }
                Err(err) => {
                    self.post(TaskEvent::SetupCommandFailed {
                        container: container.name.clone(),
                        command: setup.command.clone(),
                        message: err.to_string(),
                    });
                    return;
                }
            }
        }

        self.post(TaskEvent::SetupCommandsCompleted {
            container: container.name.clone(),
        });
    }
}

impl StepRunner for DockerStepRunner {
    fn run_step(
        &self,
        step: TaskStep,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.execute(step))
    }
}
