//! Knock steps and validated knock sequences

use serde::Deserialize;
use std::collections::BTreeSet;
use thiserror::Error;

/// Sequence validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    #[error("Knock sequence must contain at least one step")]
    EmptySequence,

    #[error("Step {index}: port 0 is not a valid knock port")]
    InvalidPort { index: usize },

    #[error("Step {index}: port {port} requires at least one hit")]
    ZeroHits { index: usize, port: u16 },
}

/// Default number of consecutive hits per step
pub const DEFAULT_HITS: u32 = 1;

fn default_hits() -> u32 {
    DEFAULT_HITS
}

/// One element of a knock sequence
///
/// In configuration a step is either a bare port (`8002`, one hit) or a
/// table (`{ port = 7001, hits = 3 }`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "StepRepr")]
pub struct KnockStep {
    /// Port that must be knocked
    pub port: u16,
    /// Consecutive knocks on `port` needed to complete the step
    pub hits: u32,
}

impl KnockStep {
    pub fn new(port: u16, hits: u32) -> Self {
        Self { port, hits }
    }

    /// A step completed by a single knock
    pub fn single(port: u16) -> Self {
        Self::new(port, DEFAULT_HITS)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StepRepr {
    Port(u16),
    Step {
        port: u16,
        #[serde(default = "default_hits")]
        hits: u32,
    },
}

impl From<StepRepr> for KnockStep {
    fn from(repr: StepRepr) -> Self {
        match repr {
            StepRepr::Port(port) => KnockStep::single(port),
            StepRepr::Step { port, hits } => KnockStep::new(port, hits),
        }
    }
}

/// Non-empty, validated, ordered list of knock steps
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<KnockStep>")]
pub struct KnockSequence {
    steps: Vec<KnockStep>,
}

impl KnockSequence {
    /// Validate and build a sequence
    pub fn new(steps: Vec<KnockStep>) -> Result<Self, SequenceError> {
        if steps.is_empty() {
            return Err(SequenceError::EmptySequence);
        }

        for (index, step) in steps.iter().enumerate() {
            if step.port == 0 {
                return Err(SequenceError::InvalidPort { index });
            }
            if step.hits == 0 {
                return Err(SequenceError::ZeroHits {
                    index,
                    port: step.port,
                });
            }
        }

        Ok(Self { steps })
    }

    /// Build a sequence of single-hit steps
    pub fn from_ports(ports: &[u16]) -> Result<Self, SequenceError> {
        Self::new(ports.iter().copied().map(KnockStep::single).collect())
    }

    pub fn steps(&self) -> &[KnockStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&KnockStep> {
        self.steps.get(index)
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false for a constructed sequence
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Each port referenced by the sequence, once, in ascending order
    pub fn distinct_ports(&self) -> Vec<u16> {
        self.steps
            .iter()
            .map(|s| s.port)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Total number of connection attempts needed to complete the sequence
    pub fn total_knocks(&self) -> u64 {
        self.steps.iter().map(|s| u64::from(s.hits)).sum()
    }

    /// Flattened list of ports in the order a client must knock them
    pub fn knock_order(&self) -> impl Iterator<Item = u16> + '_ {
        self.steps
            .iter()
            .flat_map(|s| std::iter::repeat_n(s.port, s.hits as usize))
    }
}

/// The built-in sequence: 7001 three times, 8002 once, 9003 twice
impl Default for KnockSequence {
    fn default() -> Self {
        Self {
            steps: vec![
                KnockStep::new(7001, 3),
                KnockStep::single(8002),
                KnockStep::new(9003, 2),
            ],
        }
    }
}

impl TryFrom<Vec<KnockStep>> for KnockSequence {
    type Error = SequenceError;

    fn try_from(steps: Vec<KnockStep>) -> Result<Self, Self::Error> {
        Self::new(steps)
    }
}
