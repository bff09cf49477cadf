//! Running knock engine

use crate::manager::{ListenerError, ListenerManager};
use futures::future::join_all;
use portknock_sequence::KnockSequence;
use portknock_tracker::{SharedAccessGranter, StateTracker};
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Everything the engine needs to start
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Address the knock listeners bind to
    pub bind_ip: IpAddr,
    pub sequence: KnockSequence,
    /// Maximum silence between two knocks of one address
    pub timeout: Duration,
    pub sweep_interval: Duration,
}

impl EngineConfig {
    pub fn new(sequence: KnockSequence, timeout: Duration) -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            sequence,
            timeout,
            sweep_interval: timeout,
        }
    }
}

/// Handle to a started engine: accept loops plus the expiry sweeper
pub struct KnockServer {
    tracker: Arc<StateTracker>,
    local_addrs: Vec<SocketAddr>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl KnockServer {
    /// Bind every knock port and start serving.
    ///
    /// Returns an error without starting anything if any port cannot be bound.
    pub async fn start(
        config: EngineConfig,
        granter: SharedAccessGranter,
    ) -> Result<Self, ListenerError> {
        if config.timeout.is_zero() {
            return Err(ListenerError::ZeroTimeout);
        }
        if config.sweep_interval.is_zero() {
            return Err(ListenerError::ZeroSweepInterval);
        }

        let manager = ListenerManager::bind(config.bind_ip, &config.sequence).await?;
        let local_addrs = manager.local_addrs();

        let tracker = Arc::new(StateTracker::new(config.sequence, config.timeout, granter));
        let (shutdown_tx, _) = broadcast::channel(1);

        let mut tasks = manager.run(tracker.clone(), &shutdown_tx);
        tasks.push(
            tracker
                .clone()
                .spawn_sweeper(config.sweep_interval, shutdown_tx.subscribe()),
        );

        info!(
            "Port knocking server running: {} steps on {} ports, timeout {:?}",
            tracker.sequence().len(),
            local_addrs.len(),
            tracker.timeout()
        );

        Ok(Self {
            tracker,
            local_addrs,
            shutdown_tx,
            tasks,
        })
    }

    pub fn tracker(&self) -> &Arc<StateTracker> {
        &self.tracker
    }

    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Stop all accept loops and the sweeper, waiting for them to exit
    pub async fn shutdown(self) {
        // No receivers left means every task already exited
        let _ = self.shutdown_tx.send(());

        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                error!("Knock task failed during shutdown: {}", e);
            }
        }
        info!("Port knocking server stopped");
    }

    /// Serve until `signal` completes, then shut down.
    /// Returns the signal's output.
    pub async fn run_until<F>(self, signal: F) -> F::Output
    where
        F: Future,
    {
        let output = signal.await;
        self.shutdown().await;
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portknock_tracker::LogGranter;

    #[tokio::test]
    async fn test_rejects_zero_durations() {
        let seq = KnockSequence::from_ports(&[1]).unwrap();

        let config = EngineConfig::new(seq.clone(), Duration::ZERO);
        assert!(matches!(
            KnockServer::start(config, Arc::new(LogGranter)).await,
            Err(ListenerError::ZeroTimeout)
        ));

        let mut config = EngineConfig::new(seq, Duration::from_secs(1));
        config.sweep_interval = Duration::ZERO;
        assert!(matches!(
            KnockServer::start(config, Arc::new(LogGranter)).await,
            Err(ListenerError::ZeroSweepInterval)
        ));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut config = EngineConfig::new(
            KnockSequence::from_ports(&[port]).unwrap(),
            Duration::from_secs(1),
        );
        config.bind_ip = "127.0.0.1".parse().unwrap();

        let server = KnockServer::start(config, Arc::new(LogGranter)).await.unwrap();
        assert_eq!(server.local_addrs().len(), 1);

        tokio::time::timeout(Duration::from_secs(2), server.shutdown())
            .await
            .expect("shutdown hung");

        // Listener is gone after shutdown
        assert!(std::net::TcpListener::bind(("127.0.0.1", port)).is_ok());
    }

    fn loopback_config() -> (EngineConfig, u16) {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut config = EngineConfig::new(
            KnockSequence::from_ports(&[port]).unwrap(),
            Duration::from_secs(1),
        );
        config.bind_ip = "127.0.0.1".parse().unwrap();
        (config, port)
    }

    #[tokio::test]
    async fn test_run_until_returns_signal_output() {
        let (config, port) = loopback_config();
        let server = KnockServer::start(config, Arc::new(LogGranter)).await.unwrap();
        assert_eq!(server.tracker().timeout(), Duration::from_secs(1));

        let (tx, rx) = tokio::sync::oneshot::channel::<u32>();
        let running = tokio::spawn(server.run_until(rx));
        tx.send(7).unwrap();

        let output = tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .expect("run_until hung")
            .unwrap();
        assert_eq!(output, Ok(7));
        assert!(std::net::TcpListener::bind(("127.0.0.1", port)).is_ok());
    }

    #[tokio::test]
    async fn test_run_until_surfaces_signal_error() {
        let (config, port) = loopback_config();
        let server = KnockServer::start(config, Arc::new(LogGranter)).await.unwrap();

        let result = server
            .run_until(async { Err::<(), _>(std::io::Error::other("no signal handler")) })
            .await;

        assert!(result.is_err());
        assert!(std::net::TcpListener::bind(("127.0.0.1", port)).is_ok());
    }
}
