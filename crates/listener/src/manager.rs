//! Knock listeners

use portknock_sequence::KnockSequence;
use portknock_tracker::StateTracker;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Pause after a failed accept before retrying
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Failed to bind knock port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Knock timeout must be non-zero")]
    ZeroTimeout,

    #[error("Sweep interval must be non-zero")]
    ZeroSweepInterval,
}

/// One bound listener per distinct port of the sequence
pub struct ListenerManager {
    listeners: Vec<(u16, TcpListener)>,
}

impl ListenerManager {
    /// Bind every distinct port of `sequence` on `bind_ip`.
    ///
    /// All-or-nothing: if any port fails, listeners bound so far are dropped
    /// and the error is returned.
    pub async fn bind(bind_ip: IpAddr, sequence: &KnockSequence) -> Result<Self, ListenerError> {
        let mut listeners = Vec::new();

        for port in sequence.distinct_ports() {
            let addr = SocketAddr::new(bind_ip, port);
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|source| ListenerError::Bind { port, source })?;
            info!("Listening for knocks on {}", addr);
            listeners.push((port, listener));
        }

        Ok(Self { listeners })
    }

    /// Addresses the listeners are bound to
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|(_, l)| l.local_addr().ok())
            .collect()
    }

    /// Spawn one accept loop per listener.
    /// Each loop exits when `shutdown` fires.
    pub fn run(
        self,
        tracker: Arc<StateTracker>,
        shutdown: &broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        self.listeners
            .into_iter()
            .map(|(port, listener)| {
                tokio::spawn(accept_loop(
                    listener,
                    port,
                    tracker.clone(),
                    shutdown.subscribe(),
                ))
            })
            .collect()
    }
}

async fn accept_loop(
    listener: TcpListener,
    port: u16,
    tracker: Arc<StateTracker>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    // The attempt is the signal; nothing is read or written
                    drop(stream);
                    tracker.record_knock(peer.ip().to_canonical(), port);
                }
                Err(e) => {
                    warn!("Accept error on knock port {}: {}", port, e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
            _ = shutdown.recv() => {
                debug!("Knock listener on port {} stopped", port);
                break;
            }
        }
    }
}
