//! Per-address knock state tracker

use crate::granter::{AccessGrant, SharedAccessGranter};
use crate::stats::TrackerStats;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use portknock_sequence::{ClientState, Knock, KnockSequence, Outcome, evaluate};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Owns the address -> progress map.
///
/// Each knock runs its read-modify-write under the shard lock for its
/// address, so knocks for one address apply in lock order while other
/// addresses only contend when they share a shard. Sweeps take the same
/// shard locks.
pub struct StateTracker {
    states: DashMap<IpAddr, ClientState>,
    sequence: KnockSequence,
    timeout: Duration,
    granter: SharedAccessGranter,
    stats: TrackerStats,
}

impl StateTracker {
    pub fn new(sequence: KnockSequence, timeout: Duration, granter: SharedAccessGranter) -> Self {
        Self {
            states: DashMap::new(),
            sequence,
            timeout,
            granter,
            stats: TrackerStats::new(),
        }
    }

    pub fn sequence(&self) -> &KnockSequence {
        &self.sequence
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }

    /// Apply a knock from `address` on `port`, stamped with the current time.
    ///
    /// Fires the granter exactly once when this knock completes the sequence.
    pub fn record_knock(&self, address: IpAddr, port: u16) -> Outcome {
        self.apply(address, port, Instant::now)
    }

    /// Apply a knock observed at a known instant
    pub fn record_knock_at(&self, address: IpAddr, port: u16, now: Instant) -> Outcome {
        self.apply(address, port, || now)
    }

    fn apply(&self, address: IpAddr, port: u16, clock: impl FnOnce() -> Instant) -> Outcome {
        let entry = self.states.entry(address);
        // Stamped under the shard lock: any sweep that already visited this
        // shard used an earlier `now`, and a later sweep sees the new state.
        let knock = Knock::new(port, clock());
        let at = SystemTime::now();

        let (next, outcome) = match entry {
            Entry::Occupied(mut entry) => {
                let (next, outcome) =
                    evaluate(Some(*entry.get()), knock, &self.sequence, self.timeout);
                match next {
                    Some(state) => *entry.get_mut() = state,
                    None => {
                        entry.remove();
                    }
                }
                (next, outcome)
            }
            Entry::Vacant(entry) => {
                let (next, outcome) = evaluate(None, knock, &self.sequence, self.timeout);
                if let Some(state) = next {
                    entry.insert(state);
                }
                (next, outcome)
            }
        };

        self.stats.record(outcome);
        self.log_outcome(address, port, next, outcome);

        if outcome == Outcome::SequenceComplete {
            self.granter.grant(AccessGrant { address, at });
        }

        outcome
    }

    fn log_outcome(&self, address: IpAddr, port: u16, next: Option<ClientState>, outcome: Outcome) {
        let total = self.sequence.len();
        match (outcome, next) {
            (Outcome::Progressed, Some(state)) => {
                let hits = self.sequence.step(state.step_index()).map_or(0, |s| s.hits);
                info!(
                    "Knock OK {} | port {} ({}/{}) step {}/{}",
                    address,
                    port,
                    state.hit_count(),
                    hits,
                    state.step_index() + 1,
                    total
                );
            }
            (Outcome::StepComplete, Some(state)) => {
                info!(
                    "Knock OK {} | port {} step {}/{} complete",
                    address,
                    port,
                    state.step_index(),
                    total
                );
            }
            (Outcome::SequenceComplete, _) => {
                info!("Knock sequence complete for {}", address);
            }
            (Outcome::Mismatch, _) => {
                info!("Invalid knock from {} on port {}, state reset", address, port);
            }
            _ => {}
        }
    }

    /// Remove every state whose last knock is more than `timeout` before `now`.
    /// Returns the number of removed entries.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.states.retain(|_, state| {
            let keep = !state.is_expired(now, self.timeout);
            if !keep {
                removed += 1;
            }
            keep
        });
        self.stats.record_swept(removed);
        removed
    }

    /// Copy of the resident state for `address`
    pub fn state_of(&self, address: &IpAddr) -> Option<ClientState> {
        self.states.get(address).map(|s| *s)
    }

    /// Number of resident states
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Run `sweep` every `interval` until `shutdown` fires
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep(Instant::now());
                        if removed > 0 {
                            debug!("Swept {} expired knock states", removed);
                        }
                    }
                    _ = shutdown.recv() => {
                        debug!("Sweeper stopped");
                        break;
                    }
                }
            }
        })
    }
}
