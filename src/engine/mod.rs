// src/engine/mod.rs

//! The task execution engine.
//!
//! This module ties together:
//! - the event and step model ([`events`], [`steps`])
//! - the rule base ([`rules`]) and stages ([`stage`])
//! - the run- and cleanup-stage planners ([`run_plan`], [`cleanup_plan`])
//! - the state machine ([`state_machine`]) that accumulates events and
//!   emits the next executable step
//! - the worker-pool dispatcher ([`dispatcher`])
//!
//! The engine holds no global state; every component is constructed fresh
//! per task invocation.

pub mod cleanup_plan;
pub mod dispatcher;
pub mod events;
pub mod rules;
pub mod run_plan;
pub mod stage;
pub mod state_machine;
pub mod status;
pub mod steps;

pub use cleanup_plan::{plan_cleanup_stage, CleanupPolicy};
pub use dispatcher::{Dispatcher, StepRunner};
pub use events::{EventLog, TaskEvent};
pub use run_plan::plan_run_stage;
pub use stage::{Stage, StageStepResult};
pub use state_machine::{NextStep, TaskStateMachine};
pub use status::{
    ManualCleanup, TaskStatus, CLEANUP_SKIPPED_EXIT_CODE, ENGINE_FAILURE_EXIT_CODE,
};
pub use steps::TaskStep;

pub use tokio_util::sync::CancellationToken;
