//! Access granter hook

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

/// A completed knock sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessGrant {
    pub address: IpAddr,
    /// Wall-clock time the completing knock was applied
    pub at: SystemTime,
}

impl AccessGrant {
    /// Time since the Unix epoch, zero for clocks set before it
    pub fn unix_time(&self) -> Duration {
        self.at.duration_since(UNIX_EPOCH).unwrap_or_default()
    }
}

/// Sink invoked exactly once per completed sequence.
///
/// Called synchronously from the knock path, so implementations should
/// hand long-running work off to another task.
pub trait AccessGranter: Send + Sync {
    fn grant(&self, grant: AccessGrant);
}

pub type SharedAccessGranter = Arc<dyn AccessGranter>;

impl<F> AccessGranter for F
where
    F: Fn(AccessGrant) + Send + Sync,
{
    fn grant(&self, grant: AccessGrant) {
        self(grant)
    }
}

/// Logs each grant and does nothing else
#[derive(Debug, Default, Clone, Copy)]
pub struct LogGranter;

impl AccessGranter for LogGranter {
    fn grant(&self, grant: AccessGrant) {
        let t = grant.unix_time();
        info!(
            "ACCESS GRANTED for {} at {}.{:03}",
            grant.address,
            t.as_secs(),
            t.subsec_millis()
        );
    }
}

/// Forwards grants to an async consumer
#[derive(Debug, Clone)]
pub struct ChannelGranter {
    tx: UnboundedSender<AccessGrant>,
}

impl ChannelGranter {
    pub fn new(tx: UnboundedSender<AccessGrant>) -> Self {
        Self { tx }
    }
}

impl AccessGranter for ChannelGranter {
    fn grant(&self, grant: AccessGrant) {
        if let Err(e) = self.tx.send(grant) {
            warn!("Failed to forward grant for {}: {}", grant.address, e);
        }
    }
}
