//! Sequence matcher
//!
//! `evaluate` maps (resident state, knock, sequence, timeout) to the next
//! state and an outcome. It is deterministic and side-effect free; the
//! tracker is responsible for storing the result.

use crate::sequence::KnockSequence;
use crate::state::ClientState;
use std::time::{Duration, Instant};

/// One observed connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Knock {
    pub port: u16,
    pub at: Instant,
}

impl Knock {
    pub fn new(port: u16, at: Instant) -> Self {
        Self { port, at }
    }
}

/// Result of applying one knock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Correct port, current step needs more hits
    Progressed,
    /// Correct port, step finished, more steps remain
    StepComplete,
    /// Correct port, last step finished; state is finalized
    SequenceComplete,
    /// Wrong port; all progress is discarded
    Mismatch,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Progressed => "progressed",
            Outcome::StepComplete => "step_complete",
            Outcome::SequenceComplete => "sequence_complete",
            Outcome::Mismatch => "mismatch",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Apply `knock` to `state`.
///
/// Absent, expired and out-of-range states all start fresh. A mismatch
/// always returns `None`, no matter how far the address had progressed.
pub fn evaluate(
    state: Option<ClientState>,
    knock: Knock,
    sequence: &KnockSequence,
    timeout: Duration,
) -> (Option<ClientState>, Outcome) {
    let mut state = state
        .filter(|s| s.step_index() < sequence.len())
        .filter(|s| !s.is_expired(knock.at, timeout))
        .unwrap_or_else(|| ClientState::fresh(knock.at));

    let Some(step) = sequence.step(state.step_index()) else {
        return (None, Outcome::Mismatch);
    };

    if knock.port != step.port {
        return (None, Outcome::Mismatch);
    }

    state.hit(knock.at);

    if state.hit_count() < step.hits {
        return (Some(state), Outcome::Progressed);
    }

    state.advance();

    if state.step_index() == sequence.len() {
        (None, Outcome::SequenceComplete)
    } else {
        (Some(state), Outcome::StepComplete)
    }
}
