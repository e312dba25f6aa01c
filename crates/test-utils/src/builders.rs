#![allow(dead_code)]

use std::collections::BTreeMap;

use taskdock::config::{
    validate_config, ConfigFile, ContainerConfig, HealthCheckConfig, ProjectSection,
    SetupCommand, TaskConfig,
};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    project: String,
    tasks: BTreeMap<String, TaskConfig>,
    containers: BTreeMap<String, ContainerConfig>,
}

impl ConfigFileBuilder {
    pub fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            tasks: BTreeMap::new(),
            containers: BTreeMap::new(),
        }
    }

    pub fn with_task(mut self, name: &str, task_container: &str) -> Self {
        self.tasks.insert(
            name.to_string(),
            TaskConfig {
                container: task_container.to_string(),
                description: None,
                dependencies: vec![],
            },
        );
        self
    }

    pub fn with_task_dependencies(mut self, name: &str, dependencies: &[&str]) -> Self {
        if let Some(task) = self.tasks.get_mut(name) {
            task.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
        }
        self
    }

    pub fn with_container(mut self, name: &str, container: ContainerConfig) -> Self {
        self.containers.insert(name.to_string(), container);
        self
    }

    /// Build and validate; panics on invalid config, since tests construct
    /// configs they expect to be valid.
    pub fn build(self) -> ConfigFile {
        let config = self.build_unvalidated();
        validate_config(&config).expect("builder produced an invalid config");
        config
    }

    /// Build without validation, for tests exercising the validator itself.
    pub fn build_unvalidated(self) -> ConfigFile {
        ConfigFile {
            project: ProjectSection {
                name: self.project,
            },
            task: self.tasks,
            container: self.containers,
        }
    }
}

/// Builder for `ContainerConfig`.
pub struct ContainerConfigBuilder {
    container: ContainerConfig,
}

impl ContainerConfigBuilder {
    /// A container that pulls the given image reference.
    pub fn pulled(image: &str) -> Self {
        Self {
            container: ContainerConfig {
                image: Some(image.to_string()),
                ..ContainerConfig::default()
            },
        }
    }

    /// A container built from the given directory.
    pub fn built(directory: &str) -> Self {
        Self {
            container: ContainerConfig {
                build_directory: Some(directory.to_string()),
                ..ContainerConfig::default()
            },
        }
    }

    pub fn command(mut self, command: &str) -> Self {
        self.container.command = Some(command.to_string());
        self
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.container.dependencies.push(dep.to_string());
        self
    }

    pub fn health_check(mut self, command: &str) -> Self {
        self.container.health_check = Some(HealthCheckConfig {
            command: Some(command.to_string()),
            ..HealthCheckConfig::default()
        });
        self
    }

    pub fn setup_command(mut self, command: &str) -> Self {
        self.container.setup_commands.push(SetupCommand {
            command: command.to_string(),
            working_directory: None,
        });
        self
    }

    pub fn environment(mut self, key: &str, value: &str) -> Self {
        self.container
            .environment
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> ContainerConfig {
        self.container
    }
}
