//! Interview decision state machine
//!
//! OPEN → ACCEPTED | REJECTED. Terminal states are final; every decision write
//! goes through `InterviewState::transition`.

use crate::error::OrchestrationError;
use crate::models::{Decision, InterviewState, Outcome};
use crate::Result;

/// What a model decision does to the interview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Still pending, nothing to persist beyond the turn.
    Stay,
    /// Interview concludes with this outcome.
    Conclude(Outcome),
}

impl InterviewState {
    /// Map the stored decision column onto a state. Unknown codes read as open.
    pub fn from_decision_code(code: Option<&str>) -> Self {
        code.and_then(Outcome::from_code)
            .map(InterviewState::from)
            .unwrap_or(InterviewState::Open)
    }

    pub fn is_concluded(&self) -> bool {
        !matches!(self, InterviewState::Open)
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            InterviewState::Open => None,
            InterviewState::Accepted => Some(Outcome::Accepted),
            InterviewState::Rejected => Some(Outcome::Rejected),
        }
    }

    /// Apply a model decision. Terminal states reject every further decision.
    pub fn transition(self, decision: Decision) -> Result<Transition> {
        if self.is_concluded() {
            return Err(OrchestrationError::AlreadyConcluded);
        }

        Ok(match decision {
            Decision::Pending => Transition::Stay,
            Decision::Accept => Transition::Conclude(Outcome::Accepted),
            Decision::Reject => Transition::Conclude(Outcome::Rejected),
        })
    }
}

impl From<Outcome> for InterviewState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Accepted => InterviewState::Accepted,
            Outcome::Rejected => InterviewState::Rejected,
        }
    }
}

/// Boundary guard: concluded users may not chat any further.
pub fn ensure_open(state: InterviewState) -> Result<()> {
    if state.is_concluded() {
        Err(OrchestrationError::AlreadyConcluded)
    } else {
        Ok(())
    }
}
