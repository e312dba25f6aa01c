// src/config/mod.rs

//! Configuration loading for `taskdock`.
//!
//! - [`model`] holds the serde data model for `Taskdock.toml`.
//! - [`loader`] reads and parses the file.
//! - [`validate`] runs semantic validation (references, cycles).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, ContainerConfig, HealthCheckConfig, ImageSource, ProjectSection, PullPolicy,
    SetupCommand, TaskConfig,
};
pub use validate::validate_config;
