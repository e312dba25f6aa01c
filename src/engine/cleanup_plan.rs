// src/engine/cleanup_plan.rs

//! Cleanup-stage planner: derives teardown from whatever exists at the
//! moment of transition, as recorded in the event log.

use tracing::debug;

use crate::engine::events::EventLog;
use crate::engine::rules::{
    DeleteTaskNetworkRule, RemoveContainerRule, StepRule, StopContainerRule,
};
use crate::engine::stage::Stage;

/// What to tear down, and when not to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupPolicy {
    CleanupAlways,
    DontCleanupOnFailure,
    DontCleanupOnSuccess,
    NeverCleanup,
}

impl CleanupPolicy {
    /// Whether automatic cleanup should run given the task outcome.
    pub fn should_cleanup(&self, task_failed: bool) -> bool {
        match self {
            Self::CleanupAlways => true,
            Self::DontCleanupOnFailure => !task_failed,
            Self::DontCleanupOnSuccess => task_failed,
            Self::NeverCleanup => false,
        }
    }
}

/// Produce the cleanup stage from the event log at transition time.
///
/// For every container with `ContainerCreated` but no `ContainerRemoved`, a
/// removal is planned, preceded by a stop when the container was started.
/// The network deletion waits for all removals.
///
/// When the policy suppresses cleanup, the stage carries no rules; the
/// manual-cleanup command list is always populated with the commands a user
/// would run by hand, so it can also be surfaced when cleanup itself fails.
pub fn plan_cleanup_stage(
    events: &EventLog,
    policy: CleanupPolicy,
    task_failed: bool,
) -> Stage {
    let leftover: Vec<_> = events
        .created_containers()
        .into_iter()
        .filter(|(name, _)| !events.container_removed(name))
        .collect();

    let mut manual_commands: Vec<String> = leftover
        .iter()
        .map(|(_, handle)| format!("docker rm --force {}", handle.name))
        .collect();

    if let Some(network) = events.network() {
        if !events.network_removed() {
            manual_commands.push(format!("docker network rm {}", network.id));
        }
    }

    if !policy.should_cleanup(task_failed) {
        debug!(?policy, task_failed, "cleanup suppressed by policy");
        return Stage::with_manual_cleanup(Vec::new(), manual_commands);
    }

    let mut rules: Vec<Box<dyn StepRule>> = Vec::new();
    let mut removed_here = Vec::new();

    for (name, handle) in leftover.iter() {
        // The daemon treats stopping an exited container as a no-op, so
        // every started container gets a stop before removal.
        let needs_stop =
            events.container_started(name) && !events.container_stopped(name);

        if needs_stop {
            rules.push(Box::new(StopContainerRule {
                container: (*name).clone(),
                handle: (*handle).clone(),
            }));
        }

        rules.push(Box::new(RemoveContainerRule {
            container: (*name).clone(),
            handle: (*handle).clone(),
            wait_for_stop: needs_stop,
        }));
        removed_here.push((*name).clone());
    }

    if let Some(network) = events.network() {
        if !events.network_removed() {
            rules.push(Box::new(DeleteTaskNetworkRule {
                network: network.clone(),
                containers: removed_here,
            }));
        }
    }

    debug!(
        rules = rules.len(),
        containers = leftover.len(),
        "planned cleanup stage"
    );

    Stage::with_manual_cleanup(rules, manual_commands)
}
