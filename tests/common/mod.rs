#![allow(dead_code)]

use std::sync::Arc;

use taskdock::config::ConfigFile;
use taskdock::dag::ContainerGraph;
use taskdock::engine::{
    plan_run_stage, CancellationToken, CleanupPolicy, NextStep, TaskStateMachine, TaskStep,
};

/// Build a state machine for the given task, ready to be driven manually.
pub fn machine_for(
    cfg: &ConfigFile,
    task: &str,
    policy: CleanupPolicy,
) -> (Arc<TaskStateMachine>, CancellationToken) {
    let graph = ContainerGraph::resolve(cfg, task).expect("graph should resolve");
    let token = CancellationToken::new();

    let machine = Arc::new(TaskStateMachine::new(
        plan_run_stage(&graph),
        policy,
        graph.task_container().name.clone(),
        token.clone(),
    ));

    (machine, token)
}

/// Pop the next step, asserting one is ready.
pub fn expect_step(machine: &TaskStateMachine, steps_still_running: bool) -> TaskStep {
    match machine.pop_next_step(steps_still_running) {
        NextStep::Ready(step) => step,
        other => panic!("expected a ready step, got {other:?}"),
    }
}

/// Assert that no step is ready (but the run is not over).
pub fn expect_none_ready(machine: &TaskStateMachine, steps_still_running: bool) {
    match machine.pop_next_step(steps_still_running) {
        NextStep::NoneReady => {}
        other => panic!("expected NoneReady, got {other:?}"),
    }
}

/// Assert that the run is over.
pub fn expect_idle(machine: &TaskStateMachine) {
    match machine.pop_next_step(false) {
        NextStep::NoneAndIdle => {}
        other => panic!("expected NoneAndIdle, got {other:?}"),
    }
}
