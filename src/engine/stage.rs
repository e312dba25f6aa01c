// src/engine/stage.rs

//! A stage: an ordered bag of rules with a completion predicate.

use crate::engine::events::EventLog;
use crate::engine::rules::{RuleResult, StepRule};
use crate::engine::steps::TaskStep;

/// Result of asking a stage for its next step.
#[derive(Debug)]
pub enum StageStepResult {
    /// A rule fired; execute this step.
    StepReady(TaskStep),
    /// Rules remain, but none is ready against the current event log.
    NoStepsReady,
    /// Every rule has fired and every emitted step has completed.
    StageComplete,
}

/// An ordered rule set plus the manual-cleanup commands that apply when this
/// stage's work is skipped or fails.
///
/// Rules are evaluated in insertion order; the first ready rule wins. A rule
/// that has fired is never evaluated again during the stage, which gives
/// every step its one-shot property.
pub struct Stage {
    rules: Vec<Box<dyn StepRule>>,
    fired: Vec<bool>,
    manual_cleanup_commands: Vec<String>,
}

impl Stage {
    pub fn new(rules: Vec<Box<dyn StepRule>>) -> Self {
        let fired = vec![false; rules.len()];
        Self {
            rules,
            fired,
            manual_cleanup_commands: Vec::new(),
        }
    }

    pub fn with_manual_cleanup(
        rules: Vec<Box<dyn StepRule>>,
        manual_cleanup_commands: Vec<String>,
    ) -> Self {
        let fired = vec![false; rules.len()];
        Self {
            rules,
            fired,
            manual_cleanup_commands,
        }
    }

    /// The shell commands a user would run to remove whatever this stage was
    /// responsible for tearing down. Empty for run stages.
    pub fn manual_cleanup_commands(&self) -> &[String] {
        &self.manual_cleanup_commands
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Evaluate unfired rules in order and return the first ready step.
    pub fn pop_next_step(&mut self, events: &EventLog) -> StageStepResult {
        for (idx, rule) in self.rules.iter().enumerate() {
            if self.fired[idx] {
                continue;
            }

            if let RuleResult::Ready(step) = rule.evaluate(events) {
                self.fired[idx] = true;
                return StageStepResult::StepReady(step);
            }
        }

        let complete = self
            .rules
            .iter()
            .enumerate()
            .all(|(idx, rule)| self.fired[idx] && rule.step_complete(events));

        if complete {
            StageStepResult::StageComplete
        } else {
            StageStepResult::NoStepsReady
        }
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("rules", &self.rules)
            .field("fired", &self.fired)
            .field("manual_cleanup_commands", &self.manual_cleanup_commands)
            .finish()
    }
}
