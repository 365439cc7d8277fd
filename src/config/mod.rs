//! Configuration management for Beacon transients
//!
//! Values resolve as env > TOML file > default.

pub mod file;

use std::time::Duration;

use crate::transport::DEFAULT_MAX_FRAME_BYTES;
use crate::{Error, Result};

use file::TransientsConfigFile;

/// Beacon transients configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub node: NodeConfig,
    pub discovery: DiscoveryConfig,
    pub call: CallConfig,
    pub server: ServerConfig,
}

/// Node identity and reconciliation cadence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Identity advertised for hosted services
    pub name: String,

    /// Minimum delay between two reconciliation passes
    pub update_interval: Duration,
}

/// Discovery polling policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub poll_interval: Duration,

    /// Zero polls exactly once
    pub timeout: Duration,

    pub minimum_providers: usize,
}

/// Call timeouts and framing limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallConfig {
    pub send_timeout: Duration,
    pub recv_timeout: Duration,
    pub max_frame_bytes: usize,
}

/// Provider listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::resolve(TransientsConfigFile::default(), |_| None)
    }
}

fn millis(value: Option<u64>, default: u64) -> Duration {
    Duration::from_millis(value.unwrap_or(default))
}

impl Config {
    /// Load configuration from environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        let config = Self::resolve(fc, |key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Merge a parsed config file with an environment lookup
    ///
    /// Unparsable environment values are ignored in favor of the file.
    pub fn resolve(fc: TransientsConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let env_u64 = |key: &str| env(key).and_then(|s| s.parse::<u64>().ok());

        let node = NodeConfig {
            name: env("BEACON_NODE_NAME")
                .or(fc.node.name)
                .unwrap_or_else(|| "beacon".to_string()),
            update_interval: millis(
                env_u64("BEACON_UPDATE_INTERVAL_MS").or(fc.node.update_interval_ms),
                1000,
            ),
        };

        let discovery = DiscoveryConfig {
            poll_interval: millis(
                env_u64("BEACON_DISCOVERY_POLL_MS").or(fc.discovery.poll_interval_ms),
                200,
            ),
            timeout: millis(
                env_u64("BEACON_DISCOVERY_TIMEOUT_MS").or(fc.discovery.timeout_ms),
                0,
            ),
            minimum_providers: fc.discovery.minimum_providers.unwrap_or(1),
        };

        let call = CallConfig {
            send_timeout: millis(
                env_u64("BEACON_SEND_TIMEOUT_MS").or(fc.call.send_timeout_ms),
                1000,
            ),
            recv_timeout: millis(
                env_u64("BEACON_RECV_TIMEOUT_MS").or(fc.call.recv_timeout_ms),
                5000,
            ),
            max_frame_bytes: fc.call.max_frame_bytes.unwrap_or(DEFAULT_MAX_FRAME_BYTES),
        };

        let server = ServerConfig {
            bind: env("BEACON_BIND")
                .or(fc.server.bind)
                .unwrap_or_else(|| "127.0.0.1:0".to_string()),
        };

        Self {
            node,
            discovery,
            call,
            server,
        }
    }

    /// Reject values that would make waits unbounded or loops spin
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending key
    pub fn validate(&self) -> Result<()> {
        if self.node.update_interval.is_zero() {
            return Err(Error::Config("node.update_interval_ms must be > 0".into()));
        }
        if self.discovery.poll_interval.is_zero() {
            return Err(Error::Config(
                "discovery.poll_interval_ms must be > 0".into(),
            ));
        }
        if self.discovery.minimum_providers == 0 {
            return Err(Error::Config(
                "discovery.minimum_providers must be >= 1".into(),
            ));
        }
        if self.call.max_frame_bytes == 0 {
            return Err(Error::Config("call.max_frame_bytes must be > 0".into()));
        }
        Ok(())
    }

    /// Discovery timeout as passed to [`crate::DiscoveryClient::discover`]
    #[must_use]
    pub fn discovery_timeout(&self) -> Option<Duration> {
        (!self.discovery.timeout.is_zero()).then_some(self.discovery.timeout)
    }

    /// Call options built from the call section
    #[must_use]
    pub fn call_options(&self) -> crate::CallOptions {
        crate::CallOptions::default()
            .send_timeout(self.call.send_timeout)
            .recv_timeout(self.call.recv_timeout)
    }
}
