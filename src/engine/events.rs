// src/engine/events.rs

//! Lifecycle events and the accumulated event log.
//!
//! Every observable outcome of executing a step (and the external
//! cancellation signal) is a [`TaskEvent`]. The engine never inspects daemon
//! state directly; rules are pure predicates over the [`EventLog`].

use crate::dag::ContainerName;
use crate::docker::{DockerContainer, DockerImage, DockerNetwork};

/// Events that drive task state transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// The per-task network exists.
    TaskNetworkReady { network: DockerNetwork },
    TaskNetworkCreationFailed { message: String },

    ImageBuilt {
        container: ContainerName,
        image: DockerImage,
    },
    ImageBuildProgress {
        container: ContainerName,
        progress: String,
    },
    ImageBuildFailed {
        container: ContainerName,
        message: String,
    },

    ImagePulled {
        container: ContainerName,
        image: DockerImage,
    },
    ImagePullProgress {
        container: ContainerName,
        progress: String,
    },
    ImagePullFailed {
        container: ContainerName,
        message: String,
    },

    ContainerCreated {
        container: ContainerName,
        handle: DockerContainer,
    },
    ContainerCreationFailed {
        container: ContainerName,
        message: String,
    },

    ContainerStarted { container: ContainerName },
    ContainerStartFailed {
        container: ContainerName,
        message: String,
    },

    ContainerBecameHealthy { container: ContainerName },
    ContainerDidNotBecomeHealthy {
        container: ContainerName,
        message: String,
    },

    /// The attached task container exited.
    RunningContainerExited {
        container: ContainerName,
        exit_code: i64,
    },
    /// The attached run could not complete (daemon error or cancellation).
    ContainerRunFailed {
        container: ContainerName,
        message: String,
    },

    ContainerStopped { container: ContainerName },
    ContainerStopFailed {
        container: ContainerName,
        message: String,
    },
    ContainerRemoved { container: ContainerName },
    ContainerRemovalFailed {
        container: ContainerName,
        message: String,
    },
    TaskNetworkRemoved,
    TaskNetworkDeletionFailed { message: String },

    SetupCommandsCompleted { container: ContainerName },
    SetupCommandFailed {
        container: ContainerName,
        command: String,
        message: String,
    },

    /// The user interrupted the run (Ctrl-C).
    UserRequestedCancellation,
}

impl TaskEvent {
    /// Whether this event denotes a failure.
    ///
    /// The state machine classifies failures in O(1) via this marker; user
    /// cancellation counts as a failure for stage-transition purposes.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::TaskNetworkCreationFailed { .. }
                | Self::ImageBuildFailed { .. }
                | Self::ImagePullFailed { .. }
                | Self::ContainerCreationFailed { .. }
                | Self::ContainerStartFailed { .. }
                | Self::ContainerDidNotBecomeHealthy { .. }
                | Self::ContainerRunFailed { .. }
                | Self::ContainerStopFailed { .. }
                | Self::ContainerRemovalFailed { .. }
                | Self::TaskNetworkDeletionFailed { .. }
                | Self::SetupCommandFailed { .. }
                | Self::UserRequestedCancellation
        )
    }

    /// Short tag for structured logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TaskNetworkReady { .. } => "task_network_ready",
            Self::TaskNetworkCreationFailed { .. } => "task_network_creation_failed",
            Self::ImageBuilt { .. } => "image_built",
            Self::ImageBuildProgress { .. } => "image_build_progress",
            Self::ImageBuildFailed { .. } => "image_build_failed",
            Self::ImagePulled { .. } => "image_pulled",
            Self::ImagePullProgress { .. } => "image_pull_progress",
            Self::ImagePullFailed { .. } => "image_pull_failed",
            Self::ContainerCreated { .. } => "container_created",
            Self::ContainerCreationFailed { .. } => "container_creation_failed",
            Self::ContainerStarted { .. } => "container_started",
            Self::ContainerStartFailed { .. } => "container_start_failed",
            Self::ContainerBecameHealthy { .. } => "container_became_healthy",
            Self::ContainerDidNotBecomeHealthy { .. } => "container_did_not_become_healthy",
            Self::RunningContainerExited { .. } => "running_container_exited",
            Self::ContainerRunFailed { .. } => "container_run_failed",
            Self::ContainerStopped { .. } => "container_stopped",
            Self::ContainerStopFailed { .. } => "container_stop_failed",
            Self::ContainerRemoved { .. } => "container_removed",
            Self::ContainerRemovalFailed { .. } => "container_removal_failed",
            Self::TaskNetworkRemoved => "task_network_removed",
            Self::TaskNetworkDeletionFailed { .. } => "task_network_deletion_failed",
            Self::SetupCommandsCompleted { .. } => "setup_commands_completed",
            Self::SetupCommandFailed { .. } => "setup_command_failed",
            Self::UserRequestedCancellation => "user_requested_cancellation",
        }
    }

    /// Human-readable message for failure events.
    pub fn failure_message(&self) -> Option<String> {
        match self {
            Self::TaskNetworkCreationFailed { message } => {
                Some(format!("creating the task network failed: {message}"))
            }
            Self::ContainerRunFailed { container, message } => {
                Some(format!("running container '{container}' failed: {message}"))
            }
            Self::ContainerStopFailed { container, message } => {
                Some(format!("stopping container '{container}' failed: {message}"))
            }
            Self::ContainerRemovalFailed { container, message } => {
                Some(format!("removing container '{container}' failed: {message}"))
            }
            Self::TaskNetworkDeletionFailed { message } => {
                Some(format!("deleting the task network failed: {message}"))
            }
            Self::ImageBuildFailed { container, message } => {
                Some(format!("building image for '{container}' failed: {message}"))
            }
            Self::ImagePullFailed { container, message } => {
                Some(format!("pulling image for '{container}' failed: {message}"))
            }
            Self::ContainerCreationFailed { container, message } => {
                Some(format!("creating container '{container}' failed: {message}"))
            }
            Self::ContainerStartFailed { container, message } => {
                Some(format!("starting container '{container}' failed: {message}"))
            }
            Self::ContainerDidNotBecomeHealthy { container, message } => {
                Some(format!("container '{container}' did not become healthy: {message}"))
            }
            Self::SetupCommandFailed {
                container,
                command,
                message,
            } => Some(format!(
                "setup command '{command}' in container '{container}' failed: {message}"
            )),
            Self::UserRequestedCancellation => Some("task cancelled by user".to_string()),
            _ => None,
        }
    }
}

/// The accumulated, logically append-only set of events for one run.
///
/// Owned by the state machine; rules and status projections read it through
/// shared references. Posting an event that is already present (same case,
/// same payload) is a no-op, which makes duplicate posts idempotent.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<TaskEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. Returns `false` when an identical event was already
    /// present (the log is a set, not a sequence).
    pub fn post(&mut self, event: TaskEvent) -> bool {
        if self.events.contains(&event) {
            return false;
        }
        self.events.push(event);
        true
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskEvent> {
        self.events.iter()
    }

    pub fn events(&self) -> &[TaskEvent] {
        &self.events
    }

    pub fn contains(&self, pred: impl Fn(&TaskEvent) -> bool) -> bool {
        self.events.iter().any(pred)
    }

    /// Whether any failure event has been observed.
    pub fn contains_failure(&self) -> bool {
        self.events.iter().any(TaskEvent::is_failure)
    }

    /// The task network handle, once `TaskNetworkReady` has been posted.
    pub fn network(&self) -> Option<&DockerNetwork> {
        self.events.iter().find_map(|e| match e {
            TaskEvent::TaskNetworkReady { network } => Some(network),
            _ => None,
        })
    }

    pub fn network_removed(&self) -> bool {
        self.contains(|e| matches!(e, TaskEvent::TaskNetworkRemoved))
    }

    /// The image for a container, from either a build or a pull event.
    pub fn image_for(&self, name: &str) -> Option<&DockerImage> {
        self.events.iter().find_map(|e| match e {
            TaskEvent::ImageBuilt { container, image } if container == name => Some(image),
            TaskEvent::ImagePulled { container, image } if container == name => Some(image),
            _ => None,
        })
    }

    /// The daemon handle for a created container.
    pub fn created_handle(&self, name: &str) -> Option<&DockerContainer> {
        self.events.iter().find_map(|e| match e {
            TaskEvent::ContainerCreated { container, handle } if container == name => {
                Some(handle)
            }
            _ => None,
        })
    }

    pub fn container_started(&self, name: &str) -> bool {
        self.contains(|e| matches!(e, TaskEvent::ContainerStarted { container } if container == name))
    }

    pub fn container_healthy(&self, name: &str) -> bool {
        self.contains(
            |e| matches!(e, TaskEvent::ContainerBecameHealthy { container } if container == name),
        )
    }

    pub fn setup_commands_completed(&self, name: &str) -> bool {
        self.contains(
            |e| matches!(e, TaskEvent::SetupCommandsCompleted { container } if container == name),
        )
    }

    pub fn container_stopped(&self, name: &str) -> bool {
        self.contains(|e| matches!(e, TaskEvent::ContainerStopped { container } if container == name))
    }

    pub fn container_removed(&self, name: &str) -> bool {
        self.contains(|e| matches!(e, TaskEvent::ContainerRemoved { container } if container == name))
    }

    /// Exit code of a container, when it has exited.
    pub fn exit_code_of(&self, name: &str) -> Option<i64> {
        self.events.iter().find_map(|e| match e {
            TaskEvent::RunningContainerExited {
                container,
                exit_code,
            } if container == name => Some(*exit_code),
            _ => None,
        })
    }

    /// All containers with a `ContainerCreated` event, with their handles.
    pub fn created_containers(&self) -> Vec<(&ContainerName, &DockerContainer)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TaskEvent::ContainerCreated { container, handle } => Some((container, handle)),
                _ => None,
            })
            .collect()
    }

    pub fn into_events(self) -> Vec<TaskEvent> {
        self.events
    }
}
