//! Outcome counters

use portknock_sequence::Outcome;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated on every knock and sweep
#[derive(Debug, Default)]
pub struct TrackerStats {
    knocks: AtomicU64,
    progressed: AtomicU64,
    steps_completed: AtomicU64,
    sequences_completed: AtomicU64,
    mismatches: AtomicU64,
    swept: AtomicU64,
}

/// Point-in-time copy of `TrackerStats`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub knocks: u64,
    pub progressed: u64,
    pub steps_completed: u64,
    pub sequences_completed: u64,
    pub mismatches: u64,
    pub swept: u64,
}

impl TrackerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, outcome: Outcome) {
        self.knocks.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Outcome::Progressed => &self.progressed,
            Outcome::StepComplete => &self.steps_completed,
            Outcome::SequenceComplete => &self.sequences_completed,
            Outcome::Mismatch => &self.mismatches,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_swept(&self, count: usize) {
        self.swept.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            knocks: self.knocks.load(Ordering::Relaxed),
            progressed: self.progressed.load(Ordering::Relaxed),
            steps_completed: self.steps_completed.load(Ordering::Relaxed),
            sequences_completed: self.sequences_completed.load(Ordering::Relaxed),
            mismatches: self.mismatches.load(Ordering::Relaxed),
            swept: self.swept.load(Ordering::Relaxed),
        }
    }
}
