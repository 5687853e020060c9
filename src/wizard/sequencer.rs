//! Step sequencing — which step lives at which index for a given branch.

use serde::{Deserialize, Serialize};

use crate::error::SequenceError;

use super::input::normalize_digits;
use super::model::SignupRecord;

/// Steps on the youth path.
pub const YOUTH_STEPS: u32 = 5;
/// Steps on the adult path; also the count while the branch is unresolved.
pub const ADULT_STEPS: u32 = 6;

/// Identity of a wizard step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Information,
    Terms,
    UserInfo,
    Verification,
    YouthSharing,
    AdultRoleSelection,
    AdultSharing,
}

impl StepKind {
    /// Steps without inputs, or whose inputs are optional, never block Next.
    pub fn always_valid(&self) -> bool {
        matches!(
            self,
            Self::Information | Self::YouthSharing | Self::AdultSharing
        )
    }

    pub fn is_sharing(&self) -> bool {
        matches!(self, Self::YouthSharing | Self::AdultSharing)
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Information => "information",
            Self::Terms => "terms",
            Self::UserInfo => "user_info",
            Self::Verification => "verification",
            Self::YouthSharing => "youth_sharing",
            Self::AdultRoleSelection => "adult_role_selection",
            Self::AdultSharing => "adult_sharing",
        };
        write!(f, "{s}")
    }
}

/// What occupies an index: a concrete step, or a blocking wait while the
/// branch is still undetermined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "kind", rename_all = "snake_case")]
pub enum StepSlot {
    Step(StepKind),
    Indeterminate,
}

impl StepSlot {
    pub fn kind(&self) -> Option<StepKind> {
        match self {
            Self::Step(kind) => Some(*kind),
            Self::Indeterminate => None,
        }
    }
}

impl std::fmt::Display for StepSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Step(kind) => write!(f, "{kind}"),
            Self::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

/// Number of steps for the record's branch. Never under-counts while the
/// branch is unresolved.
pub fn total_steps(record: &SignupRecord) -> u32 {
    match record.is_youth {
        Some(true) => YOUTH_STEPS,
        Some(false) | None => ADULT_STEPS,
    }
}

/// Map a 1-based index to its step.
pub fn step_identity(index: u32, record: &SignupRecord) -> Result<StepSlot, SequenceError> {
    let slot = match (index, record.is_youth) {
        (1, _) => StepSlot::Step(StepKind::Information),
        (2, _) => StepSlot::Step(StepKind::Terms),
        (3, _) => StepSlot::Step(StepKind::UserInfo),
        (4, _) => StepSlot::Step(StepKind::Verification),
        (5, Some(true)) => StepSlot::Step(StepKind::YouthSharing),
        (5, Some(false)) => StepSlot::Step(StepKind::AdultRoleSelection),
        (5, None) => StepSlot::Indeterminate,
        (6, Some(false)) => StepSlot::Step(StepKind::AdultSharing),
        (6, Some(true)) => return Err(SequenceError::BranchViolation { index }),
        (6, None) => StepSlot::Indeterminate,
        _ => {
            return Err(SequenceError::OutOfRange {
                index: i64::from(index),
                total: total_steps(record),
            });
        }
    };
    Ok(slot)
}

/// Clamp any requested index into `1..=total_steps(record)`.
pub fn clamp_step(requested: i64, record: &SignupRecord) -> u32 {
    let total = total_steps(record);
    requested.clamp(1, i64::from(total)) as u32
}

/// Parse the `step` query parameter. Garbage yields `None`.
pub fn parse_step_param(raw: Option<&str>) -> Option<i64> {
    raw.map(|s| normalize_digits(s.trim()))
        .and_then(|s| s.parse::<i64>().ok())
}
