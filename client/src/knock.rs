//! Knock sender

use portknock_sequence::KnockSequence;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpStream, lookup_host};
use tracing::{debug, info, trace};

/// Default connect timeout per knock
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Default pause between two knocks
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum KnockError {
    #[error("Failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("No address found for {0}")]
    NoAddress(String),
}

/// Knock timing
#[derive(Debug, Clone)]
pub struct KnockerConfig {
    /// How long a single connection attempt may take
    pub connect_timeout: Duration,
    /// Pause between consecutive attempts
    pub delay: Duration,
    /// Random extra pause added to `delay` (ms)
    pub max_jitter_ms: u64,
}

impl Default for KnockerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            delay: DEFAULT_DELAY,
            max_jitter_ms: 0,
        }
    }
}

/// Sends knock sequences
#[derive(Debug, Clone, Default)]
pub struct Knocker {
    config: KnockerConfig,
}

impl Knocker {
    pub fn new(config: KnockerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KnockerConfig {
        &self.config
    }

    /// Knock every step of `sequence` on `host`, in order.
    ///
    /// Returns the number of attempts sent. Refused, filtered and timed out
    /// attempts count the same as successful ones and are never retried.
    pub async fn knock(&self, host: &str, sequence: &KnockSequence) -> Result<usize, KnockError> {
        let ip = resolve(host).await?;
        let mut sent = 0;

        for port in sequence.knock_order() {
            if sent > 0 {
                self.pause().await;
            }
            self.knock_once(SocketAddr::new(ip, port)).await;
            sent += 1;
        }

        info!("Port knocking sent to {} ({} attempts)", ip, sent);
        Ok(sent)
    }

    async fn knock_once(&self, addr: SocketAddr) {
        match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                trace!("Knock {} connected", addr);
            }
            Ok(Err(e)) => debug!("Knock {} not accepted: {}", addr, e),
            Err(_) => debug!("Knock {} timed out", addr),
        }
    }

    async fn pause(&self) {
        let jitter = if self.config.max_jitter_ms > 0 {
            Duration::from_millis(fastrand::u64(0..=self.config.max_jitter_ms))
        } else {
            Duration::ZERO
        };
        tokio::time::sleep(self.config.delay + jitter).await;
    }
}

/// Resolve `host` once. The server keys progress by source address, so
/// every attempt must leave from the same family; IPv4 wins when both
/// resolve, matching the default `0.0.0.0` listeners.
async fn resolve(host: &str) -> Result<IpAddr, KnockError> {
    let addrs = lookup_host((host, 0))
        .await
        .map_err(|source| KnockError::Resolve {
            host: host.to_string(),
            source,
        })?;

    pick_address(addrs).ok_or_else(|| KnockError::NoAddress(host.to_string()))
}

fn pick_address(addrs: impl IntoIterator<Item = SocketAddr>) -> Option<IpAddr> {
    let mut fallback = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return Some(addr.ip());
        }
        fallback.get_or_insert(addr.ip());
    }
    fallback
}
