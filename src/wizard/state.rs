//! Wizard navigation state — current step, direction and validity.

use serde::{Deserialize, Serialize};

use super::model::SignupRecord;
use super::sequencer::{StepSlot, clamp_step, step_identity, total_steps};

/// Direction of the last transition. Only drives enter/exit animation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// Ephemeral navigation state. Never persisted; the step index is mirrored
/// into the `step` query parameter instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WizardState {
    /// Current 1-based step.
    pub step: u32,
    pub direction: Direction,
    /// Last validity reported by the active step.
    pub valid: bool,
    /// Step count for the current branch.
    pub total: u32,
    pub finished: bool,
}

impl Default for WizardState {
    fn default() -> Self {
        Self {
            step: 1,
            direction: Direction::Forward,
            valid: true,
            total: total_steps(&SignupRecord::default()),
            finished: false,
        }
    }
}

impl WizardState {
    /// Seed state for `requested` (already parsed from the URL), clamped to
    /// the record's branch.
    pub fn seeded(requested: i64, record: &SignupRecord) -> Self {
        let mut state = Self {
            step: clamp_step(requested, record),
            total: total_steps(record),
            ..Default::default()
        };
        state.reset_validity(record);
        state
    }

    /// Move to `step`, resetting trust in validity for the new step.
    pub fn go_to(&mut self, step: u32, direction: Direction, record: &SignupRecord) {
        self.step = step;
        self.direction = direction;
        match direction {
            Direction::Forward => self.reset_validity(record),
            // Keep Previous unlocked until the step reports for itself.
            Direction::Backward => self.valid = true,
        }
    }

    /// Recompute the step count and pull the index back into range.
    /// Returns true when the index moved.
    pub fn resync(&mut self, record: &SignupRecord) -> bool {
        self.total = total_steps(record);
        let clamped = clamp_step(i64::from(self.step), record);
        if clamped == self.step {
            return false;
        }
        self.step = clamped;
        self.reset_validity(record);
        true
    }

    /// Steps without required inputs start valid; all others start invalid.
    pub fn reset_validity(&mut self, record: &SignupRecord) {
        self.valid = match step_identity(self.step, record) {
            Ok(StepSlot::Step(kind)) => kind.always_valid(),
            Ok(StepSlot::Indeterminate) | Err(_) => false,
        };
    }

    pub fn is_last(&self) -> bool {
        self.step == self.total
    }
}
