// src/docker/types.rs

//! Value types for daemon resources.
//!
//! Handles are plain value copies of identifiers published by their creation
//! events; they carry no liveness and can be cloned freely.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::dag::Container;

/// An image present on the daemon, by id or reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerImage {
    pub id: String,
}

impl DockerImage {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A created container on the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerContainer {
    pub id: String,
    /// The name the container was created with on the daemon.
    pub name: String,
}

impl DockerContainer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The per-task network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerNetwork {
    pub id: String,
    pub name: String,
}

impl DockerNetwork {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Outcome of waiting on a container's health status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthOutcome {
    /// The container reported healthy.
    Healthy,
    /// Neither the config nor the image defines a health check.
    NoHealthCheck,
    /// The container exhausted its retries without becoming healthy.
    Unhealthy(String),
}

/// Fully-resolved request for creating one container.
///
/// Produced by the step runner from the container definition, the image and
/// network handles from earlier events, and the host environment.
#[derive(Debug, Clone)]
pub struct CreateContainerRequest {
    /// Name to create the container under on the daemon.
    pub name: String,
    pub container: Arc<Container>,
    pub image: DockerImage,
    pub network: DockerNetwork,
    /// Environment with host references already resolved.
    pub environment: BTreeMap<String, String>,
    /// `uid:gid` when the container runs as the current user.
    pub user: Option<String>,
}
