// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [project]
/// name = "shop"
///
/// [task.integration-tests]
/// container = "tests"
///
/// [container.tests]
/// build_directory = "docker/tests"
/// dependencies = ["db"]
///
/// [container.db]
/// image = "postgres:13"
///
/// [container.db.health_check]
/// command = "pg_isready -U postgres"
/// interval = "1s"
/// retries = 30
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    /// Project-wide settings from `[project]`.
    pub project: ProjectSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,

    /// All containers from `[container.<name>]`, keyed by container name.
    #[serde(default)]
    pub container: BTreeMap<String, ContainerConfig>,
}

/// `[project]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSection {
    /// Project name, used to name the task network and containers on the
    /// daemon (`<project>-<container>-<pid>` style).
    pub name: String,
}

/// `[task.<name>]` section.
///
/// A task names exactly one *task container* (whose exit code becomes the
/// task's exit code) and optionally extra dependency containers that are
/// started as if the task container depended on them.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Name of the task container.
    pub container: String,

    /// Human-readable description, shown in `--dry-run` output.
    #[serde(default)]
    pub description: Option<String>,

    /// Additional dependency containers for this task.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// `[container.<name>]` section.
///
/// Exactly one of `build_directory` and `image` must be set; this is
/// enforced by `config::validate`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerConfig {
    /// Build the image from this directory (relative to the config file).
    #[serde(default)]
    pub build_directory: Option<String>,

    /// Pull this image reference instead of building.
    #[serde(default)]
    pub image: Option<String>,

    /// When to pull `image` (ignored for built images).
    #[serde(default)]
    pub pull_policy: PullPolicy,

    /// Command to run, overriding the image's default.
    #[serde(default)]
    pub command: Option<String>,

    /// Entrypoint, overriding the image's default.
    #[serde(default)]
    pub entrypoint: Option<String>,

    /// Environment variables. Values starting with `$` are resolved from the
    /// host environment at container-creation time (e.g. `"$GITHUB_TOKEN"`).
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Working directory inside the container.
    #[serde(default)]
    pub working_directory: Option<String>,

    /// Volume mounts, `"local:container"` or `"local:container:mode"`.
    #[serde(default)]
    pub volumes: Vec<String>,

    /// Device mounts, same format as `volumes`.
    #[serde(default)]
    pub devices: Vec<String>,

    /// Port mappings, `"host:container"`.
    #[serde(default)]
    pub ports: Vec<String>,

    /// Containers that must be started (and healthy, if health-checked)
    /// before this one starts.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Health check configuration. When present, dependents wait for this
    /// container to report healthy rather than merely started.
    #[serde(default)]
    pub health_check: Option<HealthCheckConfig>,

    /// Run the container as the invoking user instead of the image default.
    #[serde(default)]
    pub run_as_current_user: bool,

    /// Run the container in privileged mode.
    #[serde(default)]
    pub privileged: bool,

    /// Run an init process (PID 1) inside the container.
    #[serde(default)]
    pub enable_init_process: bool,

    /// Linux capabilities to add.
    #[serde(default)]
    pub capabilities_to_add: Vec<String>,

    /// Linux capabilities to drop.
    #[serde(default)]
    pub capabilities_to_drop: Vec<String>,

    /// Extra network aliases for this container on the task network.
    #[serde(default)]
    pub additional_hostnames: Vec<String>,

    /// Extra `/etc/hosts` entries, hostname -> IP.
    #[serde(default)]
    pub additional_hosts: BTreeMap<String, String>,

    /// Commands run inside the container after it becomes healthy but before
    /// dependents may rely on it (and, for the task container, before the
    /// task itself runs).
    #[serde(default)]
    pub setup_commands: Vec<SetupCommand>,

    /// Docker log driver.
    #[serde(default)]
    pub log_driver: Option<String>,

    /// Options for the log driver.
    #[serde(default)]
    pub log_options: BTreeMap<String, String>,

    /// Size of `/dev/shm` in bytes.
    #[serde(default)]
    pub shm_size: Option<i64>,
}

impl ContainerConfig {
    /// The image source for this container.
    ///
    /// Panic-free only after validation has checked that exactly one of
    /// `build_directory` / `image` is set; call sites inside the engine run
    /// on validated config.
    pub fn image_source(&self) -> ImageSource {
        match (&self.build_directory, &self.image) {
            (Some(dir), _) => ImageSource::Build {
                directory: dir.clone(),
            },
            (None, Some(reference)) => ImageSource::Pull {
                reference: reference.clone(),
                policy: self.pull_policy,
            },
            (None, None) => ImageSource::Pull {
                reference: String::new(),
                policy: self.pull_policy,
            },
        }
    }
}

/// Where a container's image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Build { directory: String },
    Pull { reference: String, policy: PullPolicy },
}

/// Pull policy for image references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicy {
    /// Only pull when the image is not present locally.
    #[default]
    IfNotPresent,
    /// Always pull, even when a local copy exists.
    Always,
}

/// Health check settings for a container.
///
/// Fields override the image's own `HEALTHCHECK`, where declared.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthCheckConfig {
    /// Command to run inside the container to determine health.
    #[serde(default)]
    pub command: Option<String>,

    /// Time between checks, as a duration string (e.g. `"1s"`, `"500ms"`).
    #[serde(default)]
    pub interval: Option<String>,

    /// Number of consecutive failures after which the container is unhealthy.
    #[serde(default)]
    pub retries: Option<u32>,

    /// Grace period before failures count, as a duration string.
    #[serde(default)]
    pub start_period: Option<String>,
}

impl HealthCheckConfig {
    /// Effective polling interval; defaults to one second.
    pub fn effective_interval(&self) -> Duration {
        self.interval
            .as_deref()
            .and_then(parse_duration)
            .unwrap_or(Duration::from_secs(1))
    }

    /// Effective retry count; defaults to Docker's own default.
    pub fn effective_retries(&self) -> u32 {
        self.retries.unwrap_or(3)
    }

    /// Effective start period; defaults to zero.
    pub fn effective_start_period(&self) -> Duration {
        self.start_period
            .as_deref()
            .and_then(parse_duration)
            .unwrap_or(Duration::ZERO)
    }
}

/// A single setup command.
#[derive(Debug, Clone, Deserialize)]
pub struct SetupCommand {
    /// The command line, run through the container's shell.
    pub command: String,

    /// Working directory for the command; defaults to the container's.
    #[serde(default)]
    pub working_directory: Option<String>,
}

/// Parse duration strings of the form `"300ms"`, `"2s"`, `"1m"`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();

    if let Some(ms) = s.strip_suffix("ms") {
        return ms.trim().parse::<u64>().ok().map(Duration::from_millis);
    }
    if let Some(secs) = s.strip_suffix('s') {
        return secs.trim().parse::<u64>().ok().map(Duration::from_secs);
    }
    if let Some(mins) = s.strip_suffix('m') {
        return mins
            .trim()
            .parse::<u64>()
            .ok()
            .map(|m| Duration::from_secs(m * 60));
    }

    None
}
