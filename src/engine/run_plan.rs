// src/engine/run_plan.rs

//! Run-stage planner: dependency graph -> initial rule set.

use std::sync::Arc;

use crate::config::model::ImageSource;
use crate::dag::ContainerGraph;
use crate::engine::rules::{
    BuildImageRule, CreateContainerRule, PrepareTaskNetworkRule, PullImageRule,
    RunContainerRule, RunSetupCommandsRule, StartContainerRule, StepRule, WaitForHealthRule,
};
use crate::engine::stage::Stage;

/// Produce the run stage for a resolved graph.
///
/// Emits the singleton network rule; per container exactly one of build/pull
/// (by image source), then create, start, wait-for-health and setup-command
/// rules; and the run rule for the task container only. Execution order is
/// expressed entirely through rule predicates, not list position; the list
/// order only makes evaluation deterministic.
pub fn plan_run_stage(graph: &ContainerGraph) -> Stage {
    let mut rules: Vec<Box<dyn StepRule>> = vec![Box::new(PrepareTaskNetworkRule)];

    let mut names: Vec<_> = graph.nodes().map(|c| c.name.clone()).collect();
    names.sort();

    for name in names {
        let container = match graph.container(&name) {
            Some(c) => Arc::clone(c),
            None => continue,
        };

        match container.image_source() {
            ImageSource::Build { .. } => rules.push(Box::new(BuildImageRule {
                container: Arc::clone(&container),
            })),
            ImageSource::Pull { .. } => rules.push(Box::new(PullImageRule {
                container: Arc::clone(&container),
            })),
        }

        rules.push(Box::new(CreateContainerRule {
            container: Arc::clone(&container),
        }));
        rules.push(Box::new(StartContainerRule {
            container: Arc::clone(&container),
            dependencies: graph.dependencies_of(&name),
        }));
        rules.push(Box::new(WaitForHealthRule {
            container: Arc::clone(&container),
        }));
        rules.push(Box::new(RunSetupCommandsRule {
            container: Arc::clone(&container),
        }));
    }

    rules.push(Box::new(RunContainerRule {
        container: Arc::clone(graph.task_container()),
    }));

    Stage::new(rules)
}
