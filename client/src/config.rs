//! Client configuration

use crate::knock::KnockerConfig;
use anyhow::{Context, Result};
use portknock_sequence::KnockSequence;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    /// Host to knock
    #[serde(default)]
    pub target: TargetConfig,

    /// Sequence to send
    #[serde(default)]
    pub knock: KnockConfig,

    /// Knock timing
    #[serde(default)]
    pub client: TimingConfig,
}

impl ClientConfig {
    /// Load configuration from file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Target configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
        }
    }
}

/// Knock sequence configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnockConfig {
    #[serde(default)]
    pub steps: KnockSequence,
}

/// Knock timing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    /// Connect timeout per attempt in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Pause between attempts in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Maximum random extra pause in milliseconds
    #[serde(default)]
    pub max_jitter_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    500
}

fn default_delay_ms() -> u64 {
    500
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            delay_ms: default_delay_ms(),
            max_jitter_ms: 0,
        }
    }
}

impl From<&TimingConfig> for KnockerConfig {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(timing.connect_timeout_ms),
            delay: Duration::from_millis(timing.delay_ms),
            max_jitter_ms: timing.max_jitter_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portknock_sequence::KnockStep;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.target.host, "127.0.0.1");
        assert_eq!(config.knock.steps, KnockSequence::default());
        assert_eq!(config.client.delay_ms, 500);
    }

    #[test]
    fn test_parse_full() {
        let config = ClientConfig::parse(
            r#"
[target]
host = "knock.example.net"

[knock]
steps = [ { port = 4000, hits = 2 }, 5000 ]

[client]
connect_timeout_ms = 250
delay_ms = 100
max_jitter_ms = 20
"#,
        )
        .unwrap();

        assert_eq!(config.target.host, "knock.example.net");
        assert_eq!(
            config.knock.steps.steps(),
            &[KnockStep::new(4000, 2), KnockStep::single(5000)]
        );

        let knocker = KnockerConfig::from(&config.client);
        assert_eq!(knocker.connect_timeout, Duration::from_millis(250));
        assert_eq!(knocker.delay, Duration::from_millis(100));
        assert_eq!(knocker.max_jitter_ms, 20);
    }

    #[test]
    fn test_parse_rejects_empty_sequence() {
        assert!(ClientConfig::parse("[knock]\nsteps = []").is_err());
    }
}
