// src/engine/rules.rs

//! Step rules.
//!
//! One rule type per step. A rule is a pure, side-effect-free predicate over
//! the accumulated [`EventLog`]: it either returns the step it wants
//! executed or reports that its preconditions are not yet met. The one-shot
//! property (a rule fires at most once per stage) is enforced by the
//! [`Stage`](super::stage::Stage), not by the rules themselves.

use std::fmt;
use std::sync::Arc;

use crate::dag::{Container, ContainerName};
use crate::docker::{DockerContainer, DockerNetwork};
use crate::engine::events::EventLog;
use crate::engine::steps::TaskStep;

/// Result of evaluating a rule against the event log.
#[derive(Debug, Clone)]
pub enum RuleResult {
    Ready(TaskStep),
    NotReady,
}

/// A pure predicate over the event log.
pub trait StepRule: Send + Sync + fmt::Debug {
    /// Inspect past events; return the step when every precondition holds.
    fn evaluate(&self, events: &EventLog) -> RuleResult;

    /// Whether the step this rule emitted has finished, i.e. its completion
    /// event (or the matching failure event) has been observed. Stages are
    /// terminal when every rule has fired and completed.
    fn step_complete(&self, events: &EventLog) -> bool;
}

/// Sole initial rule: fires unconditionally, once.
#[derive(Debug)]
pub struct PrepareTaskNetworkRule;

impl StepRule for PrepareTaskNetworkRule {
    fn evaluate(&self, _events: &EventLog) -> RuleResult {
        RuleResult::Ready(TaskStep::PrepareTaskNetwork)
    }

    fn step_complete(&self, events: &EventLog) -> bool {
        events.network().is_some()
            || events.contains(|e| {
                matches!(e, crate::engine::TaskEvent::TaskNetworkCreationFailed { .. })
            })
    }
}

/// Build a container's image once the task network exists.
#[derive(Debug)]
pub struct BuildImageRule {
    pub container: Arc<Container>,
}

impl StepRule for BuildImageRule {
    fn evaluate(&self, events: &EventLog) -> RuleResult {
        if events.network().is_none() {
            return RuleResult::NotReady;
        }

        RuleResult::Ready(TaskStep::BuildImage {
            container: Arc::clone(&self.container),
        })
    }

    fn step_complete(&self, events: &EventLog) -> bool {
        let name = self.container.name.as_str();
        events.image_for(name).is_some()
            || events.contains(|e| {
                matches!(e, crate::engine::TaskEvent::ImageBuildFailed { container, .. } if container == name)
            })
    }
}

/// Pull a container's image once the task network exists.
#[derive(Debug)]
pub struct PullImageRule {
    pub container: Arc<Container>,
}

impl StepRule for PullImageRule {
    fn evaluate(&self, events: &EventLog) -> RuleResult {
        if events.network().is_none() {
            return RuleResult::NotReady;
        }

        RuleResult::Ready(TaskStep::PullImage {
            container: Arc::clone(&self.container),
        })
    }

    fn step_complete(&self, events: &EventLog) -> bool {
        let name = self.container.name.as_str();
        events.image_for(name).is_some()
            || events.contains(|e| {
                matches!(e, crate::engine::TaskEvent::ImagePullFailed { container, .. } if container == name)
            })
    }
}

/// Create a container once its image and the task network are ready.
#[derive(Debug)]
pub struct CreateContainerRule {
    pub container: Arc<Container>,
}

impl StepRule for CreateContainerRule {
    fn evaluate(&self, events: &EventLog) -> RuleResult {
        let network = match events.network() {
            Some(n) => n.clone(),
            None => return RuleResult::NotReady,
        };

        let image = match events.image_for(&self.container.name) {
            Some(i) => i.clone(),
            None => return RuleResult::NotReady,
        };

        RuleResult::Ready(TaskStep::CreateContainer {
            container: Arc::clone(&self.container),
            image,
            network,
        })
    }

    fn step_complete(&self, events: &EventLog) -> bool {
        let name = self.container.name.as_str();
        events.created_handle(name).is_some()
            || events.contains(|e| {
                matches!(e, crate::engine::TaskEvent::ContainerCreationFailed { container, .. } if container == name)
            })
    }
}

/// Start a created container once every dependency is ready.
///
/// This rule carries the project's load-ordering guarantee: a dependency
/// that declares a health check must have become healthy; one without a
/// health check only needs to have started. Dependents never race their
/// dependencies.
#[derive(Debug)]
pub struct StartContainerRule {
    pub container: Arc<Container>,
    pub dependencies: Vec<Arc<Container>>,
}

impl StartContainerRule {
    fn dependencies_ready(&self, events: &EventLog) -> bool {
        self.dependencies.iter().all(|dep| {
            if dep.has_health_check() {
                events.container_healthy(&dep.name)
            } else {
                events.container_started(&dep.name)
            }
        })
    }
}

impl StepRule for StartContainerRule {
    fn evaluate(&self, events: &EventLog) -> RuleResult {
        let handle = match events.created_handle(&self.container.name) {
            Some(h) => h.clone(),
            None => return RuleResult::NotReady,
        };

        if !self.dependencies_ready(events) {
            return RuleResult::NotReady;
        }

        RuleResult::Ready(TaskStep::StartContainer {
            container: Arc::clone(&self.container),
            handle,
        })
    }

    fn step_complete(&self, events: &EventLog) -> bool {
        let name = self.container.name.as_str();
        events.container_started(name)
            || events.contains(|e| {
                matches!(e, crate::engine::TaskEvent::ContainerStartFailed { container, .. } if container == name)
            })
    }
}

/// Wait for a started container to report healthy.
///
/// Scheduled for every container; the runner synthesizes an immediate
/// healthy event when the container has no health check at all.
#[derive(Debug)]
pub struct WaitForHealthRule {
    pub container: Arc<Container>,
}

impl StepRule for WaitForHealthRule {
    fn evaluate(&self, events: &EventLog) -> RuleResult {
        if !events.container_started(&self.container.name) {
            return RuleResult::NotReady;
        }

        let handle = match events.created_handle(&self.container.name) {
            Some(h) => h.clone(),
            None => return RuleResult::NotReady,
        };

        RuleResult::Ready(TaskStep::WaitForHealth {
            container: Arc::clone(&self.container),
            handle,
        })
    }

    fn step_complete(&self, events: &EventLog) -> bool {
        let name = self.container.name.as_str();
        events.container_healthy(name)
            || events.contains(|e| {
                matches!(e, crate::engine::TaskEvent::ContainerDidNotBecomeHealthy { container, .. } if container == name)
            })
    }
}

/// Run a container's setup commands once it is healthy.
///
/// Scheduled for every container; the runner synthesizes immediate success
/// when no setup commands are declared.
#[derive(Debug)]
pub struct RunSetupCommandsRule {
    pub container: Arc<Container>,
}

impl StepRule for RunSetupCommandsRule {
    fn evaluate(&self, events: &EventLog) -> RuleResult {
        if !events.container_healthy(&self.container.name) {
            return RuleResult::NotReady;
        }

        let handle = match events.created_handle(&self.container.name) {
            Some(h) => h.clone(),
            None => return RuleResult::NotReady,
        };

        RuleResult::Ready(TaskStep::RunSetupCommands {
            container: Arc::clone(&self.container),
            handle,
        })
    }

    fn step_complete(&self, events: &EventLog) -> bool {
        let name = self.container.name.as_str();
        events.setup_commands_completed(name)
            || events.contains(|e| {
                matches!(e, crate::engine::TaskEvent::SetupCommandFailed { container, .. } if container == name)
            })
    }
}

/// Attach to the task container and wait for it to exit.
///
/// Task container only; requires both health and completed setup commands.
#[derive(Debug)]
pub struct RunContainerRule {
    pub container: Arc<Container>,
}

impl StepRule for RunContainerRule {
    fn evaluate(&self, events: &EventLog) -> RuleResult {
        let name = self.container.name.as_str();

        if !events.container_healthy(name) || !events.setup_commands_completed(name) {
            return RuleResult::NotReady;
        }

        let handle = match events.created_handle(name) {
            Some(h) => h.clone(),
            None => return RuleResult::NotReady,
        };

        RuleResult::Ready(TaskStep::RunContainer {
            container: Arc::clone(&self.container),
            handle,
        })
    }

    fn step_complete(&self, events: &EventLog) -> bool {
        let name = self.container.name.as_str();
        events.exit_code_of(name).is_some()
            || events.contains(|e| {
                matches!(e, crate::engine::TaskEvent::ContainerRunFailed { container, .. } if container == name)
            })
    }
}

/// Cleanup: stop a container that was started and has not exited.
///
/// The cleanup planner only creates this rule when the stop is actually
/// needed, so it is ready immediately.
#[derive(Debug)]
pub struct StopContainerRule {
    pub container: ContainerName,
    pub handle: DockerContainer,
}

impl StepRule for StopContainerRule {
    fn evaluate(&self, _events: &EventLog) -> RuleResult {
        RuleResult::Ready(TaskStep::StopContainer {
            container: self.container.clone(),
            handle: self.handle.clone(),
        })
    }

    fn step_complete(&self, events: &EventLog) -> bool {
        events.container_stopped(&self.container)
            || events.contains(|e| {
                matches!(e, crate::engine::TaskEvent::ContainerStopFailed { container, .. } if container == &self.container)
            })
    }
}

/// Cleanup: remove a created container, after its stop when one was planned.
#[derive(Debug)]
pub struct RemoveContainerRule {
    pub container: ContainerName,
    pub handle: DockerContainer,
    /// True when a [`StopContainerRule`] for the same container exists in
    /// this stage; the removal then waits for `ContainerStopped`.
    pub wait_for_stop: bool,
}

impl StepRule for RemoveContainerRule {
    fn evaluate(&self, events: &EventLog) -> RuleResult {
        if self.wait_for_stop && !events.container_stopped(&self.container) {
            return RuleResult::NotReady;
        }

        RuleResult::Ready(TaskStep::RemoveContainer {
            container: self.container.clone(),
            handle: self.handle.clone(),
        })
    }

    fn step_complete(&self, events: &EventLog) -> bool {
        events.container_removed(&self.container)
            || events.contains(|e| {
                matches!(e, crate::engine::TaskEvent::ContainerRemovalFailed { container, .. } if container == &self.container)
            })
    }
}

/// Cleanup: delete the task network once every container scheduled for
/// removal in this stage is gone. Always the last cleanup step.
#[derive(Debug)]
pub struct DeleteTaskNetworkRule {
    pub network: DockerNetwork,
    pub containers: Vec<ContainerName>,
}

impl StepRule for DeleteTaskNetworkRule {
    fn evaluate(&self, events: &EventLog) -> RuleResult {
        let all_removed = self
            .containers
            .iter()
            .all(|c| events.container_removed(c));

        if !all_removed {
            return RuleResult::NotReady;
        }

        RuleResult::Ready(TaskStep::DeleteTaskNetwork {
            network: self.network.clone(),
        })
    }

    fn step_complete(&self, events: &EventLog) -> bool {
        events.network_removed()
            || events.contains(|e| {
                matches!(e, crate::engine::TaskEvent::TaskNetworkDeletionFailed { .. })
            })
    }
}
