// src/engine/state_machine.rs

//! The task state machine: single source of truth for one run.
//!
//! All mutable state lives behind one mutex: the event log, the current
//! stage, and the failure flags. Workers execute steps outside the lock;
//! rules are evaluated under it. A [`Notify`] doubles as the condition
//! variable the dispatcher blocks on when no step is ready.

use std::sync::Mutex;

use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::ContainerName;
use crate::engine::cleanup_plan::{plan_cleanup_stage, CleanupPolicy};
use crate::engine::events::{EventLog, TaskEvent};
use crate::engine::stage::{Stage, StageStepResult};
use crate::engine::status::{ManualCleanup, TaskStatus};
use crate::engine::steps::TaskStep;

/// Result of asking the machine for the next step.
#[derive(Debug)]
pub enum NextStep {
    /// Execute this step.
    Ready(TaskStep),
    /// Nothing to do right now; wait for more events.
    NoneReady,
    /// The run is over: both stages are terminal.
    NoneAndIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Run,
    Cleanup,
}

struct Inner {
    events: EventLog,
    stage: Stage,
    phase: Phase,
    task_failed: bool,
    failed_during_cleanup: bool,
    manual_cleanup: ManualCleanup,
}

/// Accumulates events, advances stages and emits executable steps.
pub struct TaskStateMachine {
    inner: Mutex<Inner>,
    /// Signalled on every posted event and every finished worker; the
    /// dispatcher's "no steps ready" wait.
    wake: Notify,
    cancellation: CancellationToken,
    cleanup_policy: CleanupPolicy,
    task_container: ContainerName,
}

impl TaskStateMachine {
    pub fn new(
        run_stage: Stage,
        cleanup_policy: CleanupPolicy,
        task_container: ContainerName,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                events: EventLog::new(),
                stage: run_stage,
                phase: Phase::Run,
                task_failed: false,
                failed_during_cleanup: false,
                manual_cleanup: ManualCleanup::None,
            }),
            wake: Notify::new(),
            cancellation,
            cleanup_policy,
            task_container,
        }
    }

    /// The run's cooperative cancellation token. Cancelled on the first
    /// failure event observed during the run stage.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Register interest in state changes. Must be obtained *before* a call
    /// to [`pop_next_step`](Self::pop_next_step) whose `NoneReady` result
    /// the caller intends to wait out, so no wake-up is lost.
    pub fn change_notified(&self) -> Notified<'_> {
        self.wake.notified()
    }

    /// Wake any workers parked on [`change_notified`](Self::change_notified).
    pub fn notify_workers(&self) {
        self.wake.notify_waiters();
    }

    /// Append an event to the log.
    ///
    /// Duplicate events (same case and payload) are idempotent. A failure
    /// event observed during the run stage fails the task and cancels
    /// in-flight work; one observed during cleanup marks the cleanup as
    /// failed and pins the manual-cleanup command list to the status.
    pub fn post_event(&self, event: TaskEvent) {
        let mut cancel = false;

        {
            let mut guard = self.inner.lock().expect("state machine lock poisoned");
            let inner = &mut *guard;

            if !inner.events.post(event.clone()) {
                debug!(event = event.event_type(), "duplicate event ignored");
            } else {
                debug!(event = event.event_type(), "event posted");

                if event.is_failure() {
                    match inner.phase {
                        Phase::Run => {
                            if !inner.task_failed {
                                warn!(
                                    event = event.event_type(),
                                    "task failed; cancelling in-flight work"
                                );
                            }
                            inner.task_failed = true;
                            cancel = true;
                        }
                        Phase::Cleanup => {
                            warn!(
                                event = event.event_type(),
                                "cleanup step failed; manual cleanup will be required"
                            );
                            inner.failed_during_cleanup = true;
                            inner.manual_cleanup = ManualCleanup::RequiredDueToCleanupFailure(
                                inner.stage.manual_cleanup_commands().to_vec(),
                            );
                        }
                    }
                }
            }
        }

        if cancel {
            self.cancellation.cancel();
        }

        self.wake.notify_waiters();
    }

    /// Pop the next executable step, or report why there is none.
    ///
    /// `steps_still_running` tells the machine whether any worker is
    /// currently executing a step; it gates both the failure drain and the
    /// internal-invariant check.
    pub fn pop_next_step(&self, steps_still_running: bool) -> NextStep {
        let mut guard = self.inner.lock().expect("state machine lock poisoned");
        let inner = &mut *guard;

        loop {
            // A failed run stage drains in-flight work, then jumps straight
            // to cleanup; the remaining run rules are abandoned.
            if inner.phase == Phase::Run && inner.task_failed {
                if steps_still_running {
                    return NextStep::NoneReady;
                }
                self.transition_to_cleanup(inner);
                continue;
            }

            match inner.stage.pop_next_step(&inner.events) {
                StageStepResult::StepReady(step) => {
                    debug!(step = %step, "step ready");
                    return NextStep::Ready(step);
                }
                StageStepResult::NoStepsReady => {
                    if !steps_still_running {
                        if inner.phase == Phase::Cleanup && inner.failed_during_cleanup {
                            // A failed cleanup step blocks its dependents
                            // forever; the manual-cleanup list has already
                            // been attached, so the run simply ends.
                            return NextStep::NoneAndIdle;
                        }

                        panic!(
                            "internal invariant violated: no steps ready, no steps running, \
                             and the current stage is not complete (phase {:?})",
                            inner.phase
                        );
                    }
                    return NextStep::NoneReady;
                }
                StageStepResult::StageComplete => match inner.phase {
                    Phase::Run => {
                        self.transition_to_cleanup(inner);
                        continue;
                    }
                    Phase::Cleanup => return NextStep::NoneAndIdle,
                },
            }
        }
    }

    fn transition_to_cleanup(&self, inner: &mut Inner) {
        info!(task_failed = inner.task_failed, "entering cleanup stage");

        let stage =
            plan_cleanup_stage(&inner.events, self.cleanup_policy, inner.task_failed);

        if !self.cleanup_policy.should_cleanup(inner.task_failed)
            && !stage.manual_cleanup_commands().is_empty()
        {
            let commands = stage.manual_cleanup_commands().to_vec();
            inner.manual_cleanup = if inner.task_failed {
                ManualCleanup::RequiredDueToFailure(commands)
            } else {
                ManualCleanup::RequiredDueToSuccess(commands)
            };
        }

        inner.stage = stage;
        inner.phase = Phase::Cleanup;
    }

    /// Whether a failure event has been observed during the run stage.
    pub fn task_failed(&self) -> bool {
        self.inner
            .lock()
            .expect("state machine lock poisoned")
            .task_failed
    }

    /// Snapshot the final status. Meaningful once the dispatcher has drained
    /// to `NoneAndIdle`.
    pub fn status(&self) -> TaskStatus {
        let inner = self.inner.lock().expect("state machine lock poisoned");

        TaskStatus {
            exit_code: inner.events.exit_code_of(&self.task_container),
            failed: inner.task_failed,
            manual_cleanup: inner.manual_cleanup.clone(),
            events: inner.events.clone().into_events(),
        }
    }
}
