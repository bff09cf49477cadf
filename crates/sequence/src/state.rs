//! Per-address progress through a knock sequence

use std::time::{Duration, Instant};

/// Progress of one source address through the sequence
///
/// `step_index` is always below the sequence length for a resident state;
/// a state that reaches the end is finalized by the matcher and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientState {
    step_index: usize,
    hit_count: u32,
    last_knock: Instant,
}

impl ClientState {
    /// Fresh state at the start of the sequence
    pub fn fresh(now: Instant) -> Self {
        Self::new(0, 0, now)
    }

    pub fn new(step_index: usize, hit_count: u32, last_knock: Instant) -> Self {
        Self {
            step_index,
            hit_count,
            last_knock,
        }
    }

    /// Index of the step currently being knocked
    pub fn step_index(&self) -> usize {
        self.step_index
    }

    /// Hits already observed on the current step
    pub fn hit_count(&self) -> u32 {
        self.hit_count
    }

    /// Time of the last accepted knock
    pub fn last_knock(&self) -> Instant {
        self.last_knock
    }

    /// Whether more than `timeout` has passed since the last knock.
    /// Knocks stamped before `last_knock` count as no time passed.
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_knock) > timeout
    }

    pub(crate) fn hit(&mut self, now: Instant) {
        self.hit_count += 1;
        self.last_knock = now;
    }

    pub(crate) fn advance(&mut self) {
        self.step_index += 1;
        self.hit_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_strict() {
        let t0 = Instant::now();
        let state = ClientState::fresh(t0);
        let timeout = Duration::from_secs(5);

        assert!(!state.is_expired(t0 + timeout, timeout));
        assert!(state.is_expired(t0 + timeout + Duration::from_millis(1), timeout));
    }

    #[test]
    fn test_earlier_knock_is_not_expired() {
        let t0 = Instant::now();
        let state = ClientState::fresh(t0 + Duration::from_secs(10));

        assert!(!state.is_expired(t0, Duration::from_secs(1)));
    }
}
