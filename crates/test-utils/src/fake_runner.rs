use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use taskdock::docker::{DockerContainer, DockerImage, DockerNetwork};
use taskdock::engine::{StepRunner, TaskEvent, TaskStateMachine, TaskStep};

/// A fake step runner that:
/// - records every step it was handed (as display strings)
/// - immediately posts the step's success event, without touching a daemon
/// - can be told to fail specific image builds/pulls instead.
pub struct FakeStepRunner {
    machine: Arc<TaskStateMachine>,
    executed: Arc<Mutex<Vec<String>>>,
    task_exit_code: i64,
    image_failures: HashMap<String, String>,
}

impl FakeStepRunner {
    pub fn new(machine: Arc<TaskStateMachine>) -> Self {
        Self {
            machine,
            executed: Arc::new(Mutex::new(Vec::new())),
            task_exit_code: 0,
            image_failures: HashMap::new(),
        }
    }

    /// Exit code the fake task container "exits" with.
    pub fn with_task_exit_code(mut self, code: i64) -> Self {
        self.task_exit_code = code;
        self
    }

    /// Fail the build/pull step for the named container.
    pub fn with_image_failure(mut self, container: &str, message: &str) -> Self {
        self.image_failures
            .insert(container.to_string(), message.to_string());
        self
    }

    /// Steps executed so far, in execution order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    /// Handle to the executed-steps list, for assertions after the runner
    /// has been moved into a dispatcher.
    pub fn executed_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.executed)
    }

    fn complete(&self, step: TaskStep) {
        let post = |e| self.machine.post_event(e);

        match step {
            TaskStep::PrepareTaskNetwork => post(TaskEvent::TaskNetworkReady {
                network: DockerNetwork::new("net-id", "fake-net"),
            }),
            TaskStep::BuildImage { container } => {
                match self.image_failures.get(&container.name) {
                    Some(message) => post(TaskEvent::ImageBuildFailed {
                        container: container.name.clone(),
                        message: message.clone(),
                    }),
                    None => post(TaskEvent::ImageBuilt {
                        container: container.name.clone(),
                        image: DockerImage::new(format!("img-{}", container.name)),
                    }),
                }
            }
            TaskStep::PullImage { container } => {
                match self.image_failures.get(&container.name) {
                    Some(message) => post(TaskEvent::ImagePullFailed {
                        container: container.name.clone(),
                        message: message.clone(),
                    }),
                    None => post(TaskEvent::ImagePulled {
                        container: container.name.clone(),
                        image: DockerImage::new(format!("img-{}", container.name)),
                    }),
                }
            }
            TaskStep::CreateContainer { container, .. } => post(TaskEvent::ContainerCreated {
                container: container.name.clone(),
                handle: DockerContainer::new(
                    format!("ctr-{}", container.name),
                    container.name.clone(),
                ),
            }),
            TaskStep::StartContainer { container, .. } => post(TaskEvent::ContainerStarted {
                container: container.name.clone(),
            }),
            TaskStep::WaitForHealth { container, .. } => {
                post(TaskEvent::ContainerBecameHealthy {
                    container: container.name.clone(),
                })
            }
            TaskStep::RunSetupCommands { container, .. } => {
                post(TaskEvent::SetupCommandsCompleted {
                    container: container.name.clone(),
                })
            }
            TaskStep::RunContainer { container, .. } => {
                post(TaskEvent::RunningContainerExited {
                    container: container.name.clone(),
                    exit_code: self.task_exit_code,
                })
            }
            TaskStep::StopContainer { container, .. } => {
                post(TaskEvent::ContainerStopped { container })
            }
            TaskStep::RemoveContainer { container, .. } => {
                post(TaskEvent::ContainerRemoved { container })
            }
            TaskStep::DeleteTaskNetwork { .. } => post(TaskEvent::TaskNetworkRemoved),
        }
    }
}

impl StepRunner for FakeStepRunner {
    fn run_step(
        &self,
        step: TaskStep,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.executed.lock().unwrap().push(step.to_string());
            self.complete(step);
        })
    }
}
