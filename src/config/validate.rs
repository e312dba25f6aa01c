// src/config/validate.rs

use anyhow::{anyhow, Result};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::ConfigFile;

/// Run semantic validation against a loaded configuration.
///
/// This checks:
/// - there is at least one task
/// - every task's `container` refers to an existing container
/// - every `dependencies` entry (task-level and container-level) refers to an
///   existing container, and no container depends on itself
/// - every container has exactly one of `build_directory` / `image`
/// - the container dependency graph has no cycles
///
/// It does **not** parse duration strings in health checks; those fall back
/// to defaults when malformed.
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_task_references(cfg)?;
    validate_image_sources(cfg)?;
    validate_container_dependencies(cfg)?;
    validate_dependency_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &ConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(anyhow!(
            "config must contain at least one [task.<name>] section"
        ));
    }
    Ok(())
}

fn validate_task_references(cfg: &ConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if !cfg.container.contains_key(&task.container) {
            return Err(anyhow!(
                "task '{}' refers to unknown container '{}'",
                name,
                task.container
            ));
        }

        for dep in task.dependencies.iter() {
            if !cfg.container.contains_key(dep) {
                return Err(anyhow!(
                    "task '{}' has unknown dependency '{}'",
                    name,
                    dep
                ));
            }
        }
    }
    Ok(())
}

fn validate_image_sources(cfg: &ConfigFile) -> Result<()> {
    for (name, container) in cfg.container.iter() {
        match (&container.build_directory, &container.image) {
            (Some(_), Some(_)) => {
                return Err(anyhow!(
                    "container '{}' has both `build_directory` and `image`; pick one",
                    name
                ));
            }
            (None, None) => {
                return Err(anyhow!(
                    "container '{}' has neither `build_directory` nor `image`",
                    name
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

fn validate_container_dependencies(cfg: &ConfigFile) -> Result<()> {
    for (name, container) in cfg.container.iter() {
        for dep in container.dependencies.iter() {
            if !cfg.container.contains_key(dep) {
                return Err(anyhow!(
                    "container '{}' has unknown dependency '{}'",
                    name,
                    dep
                ));
            }
            if dep == name {
                return Err(anyhow!(
                    "container '{}' cannot depend on itself",
                    name
                ));
            }
        }
    }
    Ok(())
}

fn validate_dependency_dag(cfg: &ConfigFile) -> Result<()> {
    // Edge direction: dep -> container. A topological sort fails on cycles.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.container.keys() {
        graph.add_node(name.as_str());
    }

    for (name, container) in cfg.container.iter() {
        for dep in container.dependencies.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(anyhow!(
                "container dependency cycle detected involving '{}'",
                node
            ))
        }
    }
}
