// src/docker/mod.rs

//! Docker daemon access.
//!
//! - [`types`] holds the value types for daemon resources (images,
//!   containers, networks) and the resolved create request.
//! - [`client`] defines the [`DockerClient`] trait the step runners talk to,
//!   plus the production implementation backed by `bollard`.
//! - [`host`] provides the host environment map and current-user lookup.

pub mod client;
pub mod host;
pub mod types;

pub use client::{DaemonClient, DockerClient};
pub use host::{current_user_spec, host_environment, resolve_environment};
pub use types::{
    CreateContainerRequest, DockerContainer, DockerImage, DockerNetwork, HealthOutcome,
};
