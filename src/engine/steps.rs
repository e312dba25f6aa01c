// src/engine/steps.rs

//! Executable steps.
//!
//! A step is a single-use token emitted by the state machine and executed by
//! exactly one dispatcher worker. Run-stage steps carry their container
//! definition so runners can resolve configuration without reaching back
//! into the graph; cleanup steps only need names and handles.

use std::fmt;
use std::sync::Arc;

use crate::dag::{Container, ContainerName};
use crate::docker::{DockerContainer, DockerImage, DockerNetwork};

/// Directives a step runner can execute.
#[derive(Debug, Clone)]
pub enum TaskStep {
    PrepareTaskNetwork,

    BuildImage {
        container: Arc<Container>,
    },
    PullImage {
        container: Arc<Container>,
    },

    CreateContainer {
        container: Arc<Container>,
        image: DockerImage,
        network: DockerNetwork,
    },
    StartContainer {
        container: Arc<Container>,
        handle: DockerContainer,
    },
    WaitForHealth {
        container: Arc<Container>,
        handle: DockerContainer,
    },
    RunSetupCommands {
        container: Arc<Container>,
        handle: DockerContainer,
    },

    /// Attach to the already-started task container and wait for it to exit.
    RunContainer {
        container: Arc<Container>,
        handle: DockerContainer,
    },

    StopContainer {
        container: ContainerName,
        handle: DockerContainer,
    },
    RemoveContainer {
        container: ContainerName,
        handle: DockerContainer,
    },
    DeleteTaskNetwork {
        network: DockerNetwork,
    },
}

impl fmt::Display for TaskStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrepareTaskNetwork => write!(f, "prepare task network"),
            Self::BuildImage { container } => write!(f, "build image for '{}'", container.name),
            Self::PullImage { container } => write!(f, "pull image for '{}'", container.name),
            Self::CreateContainer { container, .. } => {
                write!(f, "create container '{}'", container.name)
            }
            Self::StartContainer { container, .. } => {
                write!(f, "start container '{}'", container.name)
            }
            Self::WaitForHealth { container, .. } => {
                write!(f, "wait for '{}' to become healthy", container.name)
            }
            Self::RunSetupCommands { container, .. } => {
                write!(f, "run setup commands in '{}'", container.name)
            }
            Self::RunContainer { container, .. } => write!(f, "run '{}'", container.name),
            Self::StopContainer { container, .. } => write!(f, "stop container '{container}'"),
            Self::RemoveContainer { container, .. } => {
                write!(f, "remove container '{container}'")
            }
            Self::DeleteTaskNetwork { .. } => write!(f, "delete task network"),
        }
    }
}
