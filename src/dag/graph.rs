// src/dag/graph.rs

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use thiserror::Error;

use crate::config::model::{ConfigFile, ContainerConfig, ImageSource};

/// Public type alias for container names throughout the engine.
pub type ContainerName = String;

/// A container definition resolved for one task run.
///
/// Immutable once the graph is built; shared via `Arc` between the graph,
/// the rules and the step runners.
#[derive(Debug, Clone)]
pub struct Container {
    pub name: ContainerName,
    pub config: ContainerConfig,
}

impl Container {
    /// Where this container's image comes from.
    pub fn image_source(&self) -> ImageSource {
        self.config.image_source()
    }

    /// Whether the config declares a health check.
    ///
    /// Dependents of a health-checked container wait for it to report
    /// healthy; dependents of a plain container only wait for it to start.
    pub fn has_health_check(&self) -> bool {
        self.config.health_check.is_some()
    }

    /// Whether the config declares setup commands.
    pub fn has_setup_commands(&self) -> bool {
        !self.config.setup_commands.is_empty()
    }
}

/// Errors raised while resolving the graph.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("task '{0}' is not defined in the configuration")]
    UnknownTask(String),

    #[error("container '{name}' (referenced by '{referenced_by}') is not defined")]
    UnknownContainer {
        name: ContainerName,
        referenced_by: String,
    },

    #[error("container dependency cycle detected involving '{0}'")]
    DependencyCycle(ContainerName),
}

#[derive(Debug)]
struct GraphNode {
    container: Arc<Container>,
    /// Effective direct dependencies; for the task container this includes
    /// the task-level `dependencies` list.
    deps: Vec<ContainerName>,
}

/// The dependency graph for a single task invocation.
///
/// Nodes are the task container plus everything transitively reachable from
/// it. Edge `a -> b` means "a depends on b".
#[derive(Debug)]
pub struct ContainerGraph {
    nodes: HashMap<ContainerName, GraphNode>,
    task_container: ContainerName,
}

impl ContainerGraph {
    /// Resolve the graph for the named task.
    ///
    /// Walks the dependency closure breadth-first from the task container,
    /// then re-checks acyclicity over the reached subgraph. The config is
    /// otherwise assumed to be validated.
    pub fn resolve(cfg: &ConfigFile, task_name: &str) -> Result<Self, GraphError> {
        let task = cfg
            .task
            .get(task_name)
            .ok_or_else(|| GraphError::UnknownTask(task_name.to_string()))?;

        let task_container = task.container.clone();

        let mut nodes: HashMap<ContainerName, GraphNode> = HashMap::new();
        let mut queue: VecDeque<(ContainerName, String)> = VecDeque::new();
        queue.push_back((task_container.clone(), format!("task '{task_name}'")));

        while let Some((name, referenced_by)) = queue.pop_front() {
            if nodes.contains_key(&name) {
                continue;
            }

            let config = cfg.container.get(&name).ok_or_else(|| {
                GraphError::UnknownContainer {
                    name: name.clone(),
                    referenced_by: referenced_by.clone(),
                }
            })?;

            let mut deps = config.dependencies.clone();
            if name == task_container {
                for extra in task.dependencies.iter() {
                    if !deps.contains(extra) {
                        deps.push(extra.clone());
                    }
                }
            }

            for dep in deps.iter() {
                queue.push_back((dep.clone(), format!("container '{name}'")));
            }

            nodes.insert(
                name.clone(),
                GraphNode {
                    container: Arc::new(Container {
                        name: name.clone(),
                        config: config.clone(),
                    }),
                    deps,
                },
            );
        }

        let graph = Self {
            nodes,
            task_container,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    fn check_acyclic(&self) -> Result<(), GraphError> {
        // Edge direction: dep -> dependent; a toposort fails on cycles.
        let mut dag: DiGraphMap<&str, ()> = DiGraphMap::new();

        for name in self.nodes.keys() {
            dag.add_node(name.as_str());
        }
        for (name, node) in self.nodes.iter() {
            for dep in node.deps.iter() {
                dag.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        match toposort(&dag, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(GraphError::DependencyCycle(
                cycle.node_id().to_string(),
            )),
        }
    }

    /// All containers in the graph, in unspecified order.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<Container>> {
        self.nodes.values().map(|n| &n.container)
    }

    /// Number of containers in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a container by name.
    pub fn container(&self, name: &str) -> Option<&Arc<Container>> {
        self.nodes.get(name).map(|n| &n.container)
    }

    /// Direct dependencies of the named container, as shared definitions.
    pub fn dependencies_of(&self, name: &str) -> Vec<Arc<Container>> {
        self.nodes
            .get(name)
            .map(|n| {
                n.deps
                    .iter()
                    .filter_map(|d| self.nodes.get(d))
                    .map(|d| Arc::clone(&d.container))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The task container node.
    pub fn task_container(&self) -> &Arc<Container> {
        // The task container is inserted first during `resolve`.
        &self.nodes[&self.task_container].container
    }
}
