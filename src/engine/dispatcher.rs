// src/engine/dispatcher.rs

//! The dispatcher: a fixed pool of identical workers that repeatedly pull
//! the next step from the state machine, hand it to the step runner, and
//! feed the resulting events back in.
//!
//! Workers run outside the state machine's mutex; a worker blocked on
//! daemon I/O never blocks rule evaluation. Steps for different containers
//! run in parallel; a single container's transitions are serialized by the
//! rules themselves.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::engine::state_machine::{NextStep, TaskStateMachine};
use crate::engine::steps::TaskStep;

/// Seam between the dispatcher and whatever executes steps.
///
/// The production implementation translates steps into daemon calls and
/// posts lifecycle events back through the state machine; tests can provide
/// an implementation that synthesizes events directly.
pub trait StepRunner: Send + Sync {
    /// Execute one step to completion.
    ///
    /// Implementations must not return early on failure: every outcome,
    /// including cancellation, is reported as an event before the future
    /// resolves.
    fn run_step(
        &self,
        step: TaskStep,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Worker-pool dispatcher for one task run.
pub struct Dispatcher {
    machine: Arc<TaskStateMachine>,
    runner: Arc<dyn StepRunner>,
    parallelism: usize,
}

impl Dispatcher {
    pub fn new(
        machine: Arc<TaskStateMachine>,
        runner: Arc<dyn StepRunner>,
        parallelism: usize,
    ) -> Self {
        Self {
            machine,
            runner,
            parallelism: parallelism.max(1),
        }
    }

    /// Run the pool until the state machine reports `NoneAndIdle`.
    pub async fn run(&self) {
        info!(workers = self.parallelism, "dispatcher started");

        let busy = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::with_capacity(self.parallelism);

        for worker in 0..self.parallelism {
            let machine = Arc::clone(&self.machine);
            let runner = Arc::clone(&self.runner);
            let busy = Arc::clone(&busy);

            handles.push(tokio::spawn(async move {
                worker_loop(worker, machine, runner, busy).await;
            }));
        }

        for handle in handles {
            // A worker can only terminate by observing NoneAndIdle or by the
            // internal-invariant panic, which should take the process down.
            if let Err(err) = handle.await {
                if err.is_panic() {
                    std::panic::resume_unwind(err.into_panic());
                }
            }
        }

        info!("dispatcher finished; state machine is idle");
    }
}

async fn worker_loop(
    worker: usize,
    machine: Arc<TaskStateMachine>,
    runner: Arc<dyn StepRunner>,
    busy: Arc<AtomicUsize>,
) {
    loop {
        // Register for wake-ups before polling the machine, so an event
        // posted between the poll and the wait still wakes this worker.
        // `enable` is what actually registers the waiter; merely creating
        // the future does not.
        let notified = machine.change_notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        // The busy count includes this worker while it polls, and stays
        // held while it executes a claimed step. A step that has been
        // popped but not yet started can therefore never be invisible to
        // the other workers' `steps_still_running` view.
        busy.fetch_add(1, Ordering::SeqCst);
        let others_running = busy.load(Ordering::SeqCst) > 1;

        match machine.pop_next_step(others_running) {
            NextStep::Ready(step) => {
                debug!(worker, step = %step, "worker executing step");

                runner.run_step(step).await;

                busy.fetch_sub(1, Ordering::SeqCst);
                // Re-check NoneAndIdle conditions on every worker that is
                // parked: the busy count just changed.
                machine.notify_workers();
            }
            NextStep::NoneReady => {
                busy.fetch_sub(1, Ordering::SeqCst);
                debug!(worker, "no steps ready; waiting");
                notified.await;
            }
            NextStep::NoneAndIdle => {
                busy.fetch_sub(1, Ordering::SeqCst);
                debug!(worker, "state machine idle; worker exiting");
                break;
            }
        }
    }
}
