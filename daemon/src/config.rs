//! Daemon configuration

use anyhow::{Context, Result};
use portknock_listener::EngineConfig;
use portknock_sequence::KnockSequence;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Semantic configuration errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("knock.timeout_ms must be greater than zero")]
    ZeroTimeout,

    #[error("knock.sweep_interval_ms must be greater than zero")]
    ZeroSweepInterval,
}

/// Daemon configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Knock sequence and timing
    #[serde(default)]
    pub knock: KnockConfig,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl DaemonConfig {
    /// Load configuration from file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: DaemonConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Load a second file and merge it over this one
    pub async fn load_merge(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let other = Self::load(path).await?;
        self.merge(other);
        Ok(())
    }

    /// Merge another config into this one
    ///
    /// Values in `other` that differ from their defaults overwrite ours.
    /// The knock sequence is replaced as a whole, never merged step by step.
    pub fn merge(&mut self, other: DaemonConfig) {
        if other.server.bind_ip != default_bind_ip() {
            self.server.bind_ip = other.server.bind_ip;
        }

        if other.knock.timeout_ms != default_timeout_ms() {
            self.knock.timeout_ms = other.knock.timeout_ms;
        }
        if other.knock.sweep_interval_ms != default_sweep_interval_ms() {
            self.knock.sweep_interval_ms = other.knock.sweep_interval_ms;
        }
        if other.knock.steps != KnockSequence::default() {
            self.knock.steps = other.knock.steps;
        }

        if other.monitoring.prometheus_bind != default_prometheus_bind() {
            self.monitoring.prometheus_bind = other.monitoring.prometheus_bind;
        }
        if other.monitoring.prometheus_enabled {
            self.monitoring.prometheus_enabled = true;
        }
    }

    /// Check values the type system cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.knock.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.knock.sweep_interval_ms == 0 {
            return Err(ConfigError::ZeroSweepInterval);
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            bind_ip: self.server.bind_ip,
            sequence: self.knock.steps.clone(),
            timeout: self.knock.timeout(),
            sweep_interval: self.knock.sweep_interval(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the knock listeners bind to
    #[serde(default = "default_bind_ip")]
    pub bind_ip: IpAddr,
}

fn default_bind_ip() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: default_bind_ip(),
        }
    }
}

/// Knock configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KnockConfig {
    /// Maximum silence between two knocks of one address, in ms
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// How often expired states are swept, in ms
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// The knock sequence
    #[serde(default)]
    pub steps: KnockSequence,
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

impl KnockConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for KnockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            steps: KnockSequence::default(),
        }
    }
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// Prometheus metrics bind address
    #[serde(default = "default_prometheus_bind")]
    pub prometheus_bind: SocketAddr,

    /// Enable Prometheus
    #[serde(default)]
    pub prometheus_enabled: bool,
}

fn default_prometheus_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9464))
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_bind: default_prometheus_bind(),
            prometheus_enabled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portknock_sequence::KnockStep;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.bind_ip, default_bind_ip());
        assert_eq!(config.knock.timeout(), Duration::from_secs(1));
        assert_eq!(config.knock.steps.distinct_ports(), vec![7001, 8002, 9003]);
        assert!(!config.monitoring.prometheus_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_file() {
        let config: DaemonConfig = toml::from_str(
            r#"
[server]
bind_ip = "127.0.0.1"

[knock]
timeout_ms = 5000
steps = [ { port = 4001, hits = 2 }, 4002 ]

[monitoring]
prometheus_enabled = true
prometheus_bind = "127.0.0.1:9999"
"#,
        )
        .unwrap();

        let engine = config.engine_config();
        assert_eq!(engine.bind_ip, "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(engine.timeout, Duration::from_secs(5));
        assert_eq!(engine.sweep_interval, Duration::from_secs(1));
        assert_eq!(
            engine.sequence.steps(),
            &[KnockStep::new(4001, 2), KnockStep::single(4002)]
        );
        assert_eq!(config.monitoring.prometheus_bind.port(), 9999);
    }

    #[test]
    fn test_parse_rejects_bad_sequence() {
        assert!(toml::from_str::<DaemonConfig>("[knock]\nsteps = []").is_err());
        assert!(toml::from_str::<DaemonConfig>("[knock]\nsteps = [0]").is_err());
        assert!(toml::from_str::<DaemonConfig>("[knock]\nsteps = [70000]").is_err());
    }

    #[test]
    fn test_validate_zero_durations() {
        let mut config = DaemonConfig::default();
        config.knock.timeout_ms = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));

        let mut config = DaemonConfig::default();
        config.knock.sweep_interval_ms = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroSweepInterval));
    }

    #[test]
    fn test_merge_scalars() {
        let mut config = DaemonConfig::default();
        let mut other = DaemonConfig::default();
        other.knock.timeout_ms = 3000;
        other.monitoring.prometheus_enabled = true;

        config.merge(other);

        assert_eq!(config.knock.timeout_ms, 3000);
        assert_eq!(config.knock.sweep_interval_ms, default_sweep_interval_ms());
        assert!(config.monitoring.prometheus_enabled);
    }

    #[test]
    fn test_merge_replaces_sequence() {
        let mut config = DaemonConfig::default();
        config.knock.steps = KnockSequence::from_ports(&[1111, 2222]).unwrap();

        // Default sequence in the overlay leaves ours alone
        config.merge(DaemonConfig::default());
        assert_eq!(config.knock.steps.distinct_ports(), vec![1111, 2222]);

        let mut other = DaemonConfig::default();
        other.knock.steps = KnockSequence::from_ports(&[3333]).unwrap();
        config.merge(other);
        assert_eq!(config.knock.steps.distinct_ports(), vec![3333]);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = DaemonConfig::load("/nonexistent/portknockd.toml").await.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/portknockd.toml"));
    }
}
