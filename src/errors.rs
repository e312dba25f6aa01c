// src/errors.rs

//! Crate-wide error types and aliases.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskdockError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Cycle detected in container dependencies: {0}")]
    DependencyCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Docker daemon error: {0}")]
    DockerError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<bollard::errors::Error> for TaskdockError {
    fn from(err: bollard::errors::Error) -> Self {
        TaskdockError::DockerError(err.to_string())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskdockError>;
